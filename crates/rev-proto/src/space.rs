//! Protocol verb and state-key spaces.
//!
//! The exact strings are configuration: endpoints must agree, so both spaces
//! deserialize from the runtime TOML and default to the canonical names.

use serde::Deserialize;

/// The protocol verbs every endpoint understands, plus the domain verbs the
/// peripheral layer owns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeaderSpace {
    pub status: String,
    pub get: String,
    pub set: String,
    pub reset: String,
    pub sync: String,
    pub hang: String,
    pub exit: String,
    pub abort: String,
    pub response: String,
    pub heartbeat: String,

    // Domain verbs (handled by the peripheral layer, not the base runtime).
    pub gpio: String,
    pub pwm: String,
    pub spi: String,
    pub uart: String,
    pub state: String,
    pub data: String,
}

impl Default for HeaderSpace {
    fn default() -> Self {
        Self {
            status: "status".to_owned(),
            get: "get".to_owned(),
            set: "set".to_owned(),
            reset: "reset".to_owned(),
            sync: "sync".to_owned(),
            hang: "hang".to_owned(),
            exit: "exit".to_owned(),
            abort: "abort".to_owned(),
            response: "response".to_owned(),
            heartbeat: "heartbeat".to_owned(),
            gpio: "gpio".to_owned(),
            pwm: "pwm".to_owned(),
            spi: "spi".to_owned(),
            uart: "uart".to_owned(),
            state: "state".to_owned(),
            data: "data".to_owned(),
        }
    }
}

/// Well-known state keys shared by the peripheral controllers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeySpace {
    pub brake_status: String,
    pub direction: String,
    pub motor_speed: String,
    pub regen_strength: String,
    pub battery_voltage: String,
    pub battery_current: String,
    pub battery_temperature: String,
    pub fan_speed: String,
    pub headlights: String,
    pub left_indicator: String,
    pub right_indicator: String,
    pub horn: String,
    pub backlight: String,
    pub telemetry_period: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            brake_status: "brake_status".to_owned(),
            direction: "direction".to_owned(),
            motor_speed: "motor_speed".to_owned(),
            regen_strength: "regen_strength".to_owned(),
            battery_voltage: "battery_voltage".to_owned(),
            battery_current: "battery_current".to_owned(),
            battery_temperature: "battery_temperature".to_owned(),
            fan_speed: "fan_speed".to_owned(),
            headlights: "headlights".to_owned(),
            left_indicator: "left_indicator".to_owned(),
            right_indicator: "right_indicator".to_owned(),
            horn: "horn".to_owned(),
            backlight: "backlight".to_owned(),
            telemetry_period: "telemetry_period".to_owned(),
        }
    }
}
