use serde_json::{json, Value};

/// Hard-coded example specifications for `GET /api/templates`. These are
/// illustrative starting points for callers exploring the API, not
/// validated against [`forgeline_core::Specification::normalize`] at
/// request time.
pub fn example_specifications() -> Value {
    json!({
        "uart_echo": {
            "project_name": "uart-echo",
            "mcu": "ESP32",
            "description": "Single UART peripheral echoing received bytes.",
            "modules": [
                {
                    "id": "uart0",
                    "name": "UART0",
                    "type": "uart",
                    "parameters": { "baud": 115200 },
                }
            ],
            "safety_critical": false,
            "optimization_goal": "balanced"
        },
        "sensor_bus": {
            "project_name": "sensor-bus",
            "mcu": "STM32F4",
            "description": "I2C sensor read with a watchdog guarding the polling loop.",
            "modules": [
                { "id": "i2c0", "name": "I2C0", "type": "i2c", "parameters": { "address": "0x48" } },
                { "id": "wdt0", "name": "Watchdog", "type": "watchdog" }
            ],
            "safety_critical": true,
            "optimization_goal": "power"
        },
        "can_motor_control": {
            "project_name": "can-motor-control",
            "mcu": "STM32F7",
            "description": "CAN bus frame ingestion driving a PWM motor controller.",
            "modules": [
                { "id": "can0", "name": "CAN0", "type": "can" },
                { "id": "pwm0", "name": "Motor PWM", "type": "pwm" }
            ],
            "safety_critical": true,
            "optimization_goal": "performance"
        }
    })
}
