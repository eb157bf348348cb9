//! The Model-Control-Protocol (MCP) governance layer: a static, per-agent
//! capability matrix. Every artifact read, write, and agent invocation is
//! checked against it before the effect takes place.
//!
//! Unrelated to the external Model Context Protocol (a client/proxy for
//! third-party tool servers); this MCP is purely an in-process permission
//! table.

use std::collections::HashSet;

use forgeline_core::{ArtifactType, ForgeError, ForgeResult};

/// One entry in the capability matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// May be invoked by the orchestrator at all.
    RunAgent,
    /// May read artifacts of this type.
    Read(ArtifactType),
    /// May write artifacts of this type.
    Write(ArtifactType),
}

/// The static, immutable mapping of agent id -> granted permissions.
/// Lock-free: read-only after construction.
#[derive(Debug, Clone)]
pub struct CapabilityMatrix {
    grants: Vec<(String, HashSet<Permission>)>,
}

impl CapabilityMatrix {
    /// Build an empty matrix (no agent may do anything).
    pub fn new() -> Self {
        Self { grants: Vec::new() }
    }

    /// Grant `permission` to `agent_id`. Intended for matrix construction
    /// only (e.g. in `canonical()` or tests); the resulting matrix should
    /// then be treated as immutable for the life of the process.
    pub fn grant(&mut self, agent_id: impl Into<String>, permission: Permission) -> &mut Self {
        let agent_id = agent_id.into();
        if let Some((_, set)) = self.grants.iter_mut().find(|(id, _)| *id == agent_id) {
            set.insert(permission);
        } else {
            let mut set = HashSet::new();
            set.insert(permission);
            self.grants.push((agent_id, set));
        }
        self
    }

    fn permissions_of(&self, agent_id: &str) -> Option<&HashSet<Permission>> {
        self.grants
            .iter()
            .find(|(id, _)| id == agent_id)
            .map(|(_, set)| set)
    }

    /// Succeeds iff `agent_id` has been granted `run:agent`.
    pub fn check_run(&self, agent_id: &str) -> ForgeResult<()> {
        let allowed = self
            .permissions_of(agent_id)
            .is_some_and(|set| set.contains(&Permission::RunAgent));
        if allowed {
            Ok(())
        } else {
            Err(ForgeError::PermissionDenied {
                agent: agent_id.to_string(),
                action: "run".to_string(),
            })
        }
    }

    /// Succeeds iff `agent_id` has been granted `read:<type>` for the base
    /// type of `artifact_type` (a possibly-qualified string such as
    /// `"module_code:uart0"`).
    pub fn check_read(&self, agent_id: &str, artifact_type: &str) -> ForgeResult<()> {
        self.check(agent_id, artifact_type, Access::Read)
    }

    /// Succeeds iff `agent_id` has been granted `write:<type>`.
    pub fn check_write(&self, agent_id: &str, artifact_type: &str) -> ForgeResult<()> {
        self.check(agent_id, artifact_type, Access::Write)
    }

    fn check(&self, agent_id: &str, artifact_type: &str, access: Access) -> ForgeResult<()> {
        let Some(base) = ArtifactType::parse_base(artifact_type) else {
            return Err(ForgeError::PermissionDenied {
                agent: agent_id.to_string(),
                action: format!("{}:{artifact_type}", access.verb()),
            });
        };
        let permission = match access {
            Access::Read => Permission::Read(base),
            Access::Write => Permission::Write(base),
        };
        let allowed = self
            .permissions_of(agent_id)
            .is_some_and(|set| set.contains(&permission));
        if allowed {
            Ok(())
        } else {
            Err(ForgeError::PermissionDenied {
                agent: agent_id.to_string(),
                action: format!("{}:{artifact_type}", access.verb()),
            })
        }
    }

    /// The canonical matrix from the governance design (§4.1): the five
    /// concrete agents and exactly the permissions they need.
    pub fn canonical() -> Self {
        let mut matrix = Self::new();
        matrix
            .grant("architecture_agent", Permission::RunAgent)
            .grant(
                "architecture_agent",
                Permission::Write(ArtifactType::Architecture),
            )
            .grant(
                "architecture_agent",
                Permission::Read(ArtifactType::Requirements),
            );

        matrix
            .grant("code_agent", Permission::RunAgent)
            .grant("code_agent", Permission::Read(ArtifactType::Architecture))
            .grant("code_agent", Permission::Write(ArtifactType::ModuleCode));

        matrix
            .grant("test_agent", Permission::RunAgent)
            .grant("test_agent", Permission::Read(ArtifactType::ModuleCode))
            .grant("test_agent", Permission::Write(ArtifactType::Tests));

        matrix
            .grant("quality_agent", Permission::RunAgent)
            .grant("quality_agent", Permission::Read(ArtifactType::ModuleCode))
            .grant("quality_agent", Permission::Read(ArtifactType::Tests))
            .grant("quality_agent", Permission::Write(ArtifactType::Reports));

        matrix
            .grant("build_agent", Permission::RunAgent)
            .grant("build_agent", Permission::Read(ArtifactType::ModuleCode))
            .grant("build_agent", Permission::Read(ArtifactType::Tests))
            .grant("build_agent", Permission::Write(ArtifactType::BuildLog));

        matrix
    }
}

impl Default for CapabilityMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn verb(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_grants_architecture_agent_its_permissions() {
        let matrix = CapabilityMatrix::canonical();
        assert!(matrix.check_run("architecture_agent").is_ok());
        assert!(matrix
            .check_write("architecture_agent", "architecture")
            .is_ok());
        assert!(matrix
            .check_read("architecture_agent", "requirements")
            .is_ok());
    }

    #[test]
    fn canonical_denies_cross_writes() {
        let matrix = CapabilityMatrix::canonical();
        let err = matrix
            .check_write("code_agent", "reports")
            .expect_err("code_agent must not write reports");
        match err {
            ForgeError::PermissionDenied { agent, action } => {
                assert_eq!(agent, "code_agent");
                assert_eq!(action, "write:reports");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn read_check_matches_on_base_type_ignoring_qualifier() {
        let matrix = CapabilityMatrix::canonical();
        assert!(matrix
            .check_read("test_agent", "module_code:uart0")
            .is_ok());
    }

    #[test]
    fn legacy_quality_report_permission_name_is_rejected() {
        let matrix = CapabilityMatrix::canonical();
        assert!(matrix
            .check_write("quality_agent", "quality_report")
            .is_err());
    }

    #[test]
    fn unknown_agent_has_no_permissions() {
        let matrix = CapabilityMatrix::canonical();
        assert!(matrix.check_run("rogue_agent").is_err());
    }
}
