//! Peripheral helpers layered on the application runtime.
//!
//! Controllers install this layer on top of a soldier application: handlers
//! for the domain verbs (`gpio`, `pwm`, `spi`, `uart`), the `state`
//! broadcast verb, and watchers that drive a [`DeviceBus`]. The bus is the
//! seam to real hardware; actual GPIO/PWM/SPI/UART I/O lives behind it and
//! is out of scope here — [`LoggingBus`] ships as the in-tree
//! implementation.

use std::sync::Arc;

use rev_proto::Message;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::application::{Application, Watcher};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("unsupported device operation: {0}")]
    Unsupported(&'static str),
    #[error("device bus error: {0}")]
    Bus(String),
}

/// The interface contract the domain-verb handlers expect from hardware.
pub trait DeviceBus: Send + Sync {
    fn read_gpio(&self, pin: u32) -> Result<bool, DeviceError>;
    fn write_gpio(&self, pin: u32, level: bool) -> Result<(), DeviceError>;
    /// `duty_percent` in `0.0..=100.0`.
    fn set_pwm(&self, channel: u32, duty_percent: f64) -> Result<(), DeviceError>;
    fn transfer_spi(&self, bus: u32, payload: &[u8]) -> Result<Vec<u8>, DeviceError>;
    fn write_uart(&self, port: u32, payload: &[u8]) -> Result<(), DeviceError>;
}

/// A bus that logs every operation and performs none of them. GPIO reads
/// low; SPI transfers echo their payload.
pub struct LoggingBus;

impl DeviceBus for LoggingBus {
    fn read_gpio(&self, pin: u32) -> Result<bool, DeviceError> {
        info!(pin, "gpio read");
        Ok(false)
    }

    fn write_gpio(&self, pin: u32, level: bool) -> Result<(), DeviceError> {
        info!(pin, level, "gpio write");
        Ok(())
    }

    fn set_pwm(&self, channel: u32, duty_percent: f64) -> Result<(), DeviceError> {
        info!(channel, duty_percent, "pwm set");
        Ok(())
    }

    fn transfer_spi(&self, bus: u32, payload: &[u8]) -> Result<Vec<u8>, DeviceError> {
        info!(bus, bytes = payload.len(), "spi transfer");
        Ok(payload.to_vec())
    }

    fn write_uart(&self, port: u32, payload: &[u8]) -> Result<(), DeviceError> {
        info!(port, bytes = payload.len(), "uart write");
        Ok(())
    }
}

/// The installed peripheral layer.
pub struct Peripheral {
    app: Arc<Application>,
    bus: Arc<dyn DeviceBus>,
}

impl Peripheral {
    /// Register the domain-verb handlers on `app`, backed by `bus`.
    pub fn install(app: &Arc<Application>, bus: Arc<dyn DeviceBus>) -> Self {
        let headers = app.headers().clone();

        {
            let bus = Arc::clone(&bus);
            app.set_handler(
                &headers.gpio,
                Arc::new(move |_, message| Some(handle_gpio(bus.as_ref(), message))),
            );
        }
        {
            let bus = Arc::clone(&bus);
            app.set_handler(
                &headers.pwm,
                Arc::new(move |_, message| Some(handle_pwm(bus.as_ref(), message))),
            );
        }
        {
            let bus = Arc::clone(&bus);
            app.set_handler(
                &headers.spi,
                Arc::new(move |_, message| Some(handle_spi(bus.as_ref(), message))),
            );
        }
        {
            let bus = Arc::clone(&bus);
            app.set_handler(
                &headers.uart,
                Arc::new(move |_, message| Some(handle_uart(bus.as_ref(), message))),
            );
        }

        // `state` is a broadcast: notify the watcher for the key without a
        // state write, and never reply.
        app.set_handler(
            &headers.state,
            Arc::new(|app, message| {
                if message.data.len() == 2 {
                    app.notify_watcher(&message.data[0], &message.data[1]);
                } else {
                    error!(
                        arguments = message.data.len(),
                        "state broadcast expects exactly [key, value]; dropping"
                    );
                }
                None
            }),
        );

        // `data` is a telemetry push: log the pairs, no reply.
        app.set_handler(
            &headers.data,
            Arc::new(|_, message| {
                info!(pairs = message.data.len() / 2, data = ?message.data, "telemetry");
                None
            }),
        );

        Self {
            app: Arc::clone(app),
            bus,
        }
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    pub fn bus(&self) -> &Arc<dyn DeviceBus> {
        &self.bus
    }

    /// Watch a state key; sugar over [`Application::set_watcher`].
    pub fn watch(&self, key: &str, watcher: impl Fn(&str, &str) + Send + Sync + 'static) {
        let watcher: Watcher = Arc::new(watcher);
        self.app.set_watcher(key, watcher);
    }
}

// ---------------------------------------------------------------------------
// Domain verb handlers
// ---------------------------------------------------------------------------

fn handle_gpio(bus: &dyn DeviceBus, message: &Message) -> Vec<String> {
    match message.data.as_slice() {
        [op, pin] if op == "read" => {
            let Some(pin) = parse_u32(pin, "pin") else {
                return vec![];
            };
            match bus.read_gpio(pin) {
                Ok(level) => vec![pin.to_string(), u32::from(level).to_string()],
                Err(error) => {
                    error!(pin, %error, "gpio read failed");
                    vec![]
                }
            }
        }
        [op, pin, level] if op == "write" => {
            let (Some(pin), Some(level)) = (parse_u32(pin, "pin"), parse_level(level)) else {
                return vec![];
            };
            if let Err(error) = bus.write_gpio(pin, level) {
                error!(pin, %error, "gpio write failed");
            }
            vec![]
        }
        _ => {
            warn!(data = ?message.data, "gpio expects [read, pin] or [write, pin, level]");
            vec![]
        }
    }
}

fn handle_pwm(bus: &dyn DeviceBus, message: &Message) -> Vec<String> {
    let [channel, duty] = message.data.as_slice() else {
        warn!(data = ?message.data, "pwm expects [channel, duty_percent]");
        return vec![];
    };
    let Some(channel) = parse_u32(channel, "channel") else {
        return vec![];
    };
    let Ok(duty) = duty.parse::<f64>() else {
        warn!(duty = %duty, "pwm duty is not a number");
        return vec![];
    };
    if !(0.0..=100.0).contains(&duty) {
        warn!(duty, "pwm duty out of 0..=100");
        return vec![];
    }
    if let Err(error) = bus.set_pwm(channel, duty) {
        error!(channel, %error, "pwm set failed");
    }
    vec![]
}

fn handle_spi(bus: &dyn DeviceBus, message: &Message) -> Vec<String> {
    let [bus_index, payload] = message.data.as_slice() else {
        warn!(data = ?message.data, "spi expects [bus, hex_payload]");
        return vec![];
    };
    let Some(bus_index) = parse_u32(bus_index, "bus") else {
        return vec![];
    };
    let Some(payload) = hex_decode(payload) else {
        warn!(payload = %payload, "spi payload is not hex");
        return vec![];
    };
    match bus.transfer_spi(bus_index, &payload) {
        Ok(reply) => vec![hex_encode(&reply)],
        Err(error) => {
            error!(bus = bus_index, %error, "spi transfer failed");
            vec![]
        }
    }
}

fn handle_uart(bus: &dyn DeviceBus, message: &Message) -> Vec<String> {
    let [port, text] = message.data.as_slice() else {
        warn!(data = ?message.data, "uart expects [port, text]");
        return vec![];
    };
    let Some(port) = parse_u32(port, "port") else {
        return vec![];
    };
    if let Err(error) = bus.write_uart(port, text.as_bytes()) {
        error!(port, %error, "uart write failed");
    }
    vec![]
}

fn parse_u32(token: &str, what: &'static str) -> Option<u32> {
    let parsed = token.parse::<u32>().ok();
    if parsed.is_none() {
        warn!(token = %token, "{what} is not a nonnegative integer");
    }
    parsed
}

fn parse_level(token: &str) -> Option<bool> {
    match token {
        "0" | "off" | "low" => Some(false),
        "1" | "on" | "high" => Some(true),
        _ => {
            warn!(token = %token, "gpio level must be 0/1/on/off/high/low");
            None
        }
    }
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rev_proto::Message;

    fn request(header: &str, data: Vec<&str>) -> Message {
        Message::new(
            "tester",
            "controller",
            header,
            data.into_iter().map(str::to_owned).collect(),
            0,
        )
    }

    #[test]
    fn hex_round_trip() {
        let payload = [0x00, 0x7f, 0xff, 0x0a];
        assert_eq!(hex_encode(&payload), "007fff0a");
        assert_eq!(hex_decode("007fff0a").unwrap(), payload);
        assert!(hex_decode("0g").is_none());
        assert!(hex_decode("abc").is_none());
    }

    #[test]
    fn gpio_read_reports_pin_and_level() {
        let reply = handle_gpio(&LoggingBus, &request("gpio", vec!["read", "4"]));
        assert_eq!(reply, vec!["4".to_owned(), "0".to_owned()]);
    }

    #[test]
    fn gpio_rejects_malformed_requests() {
        assert!(handle_gpio(&LoggingBus, &request("gpio", vec!["toggle", "4"])).is_empty());
        assert!(handle_gpio(&LoggingBus, &request("gpio", vec!["write", "4", "up"])).is_empty());
        assert!(handle_gpio(&LoggingBus, &request("gpio", vec![])).is_empty());
    }

    #[test]
    fn spi_echoes_through_the_logging_bus() {
        let reply = handle_spi(&LoggingBus, &request("spi", vec!["0", "deadbeef"]));
        assert_eq!(reply, vec!["deadbeef".to_owned()]);
    }

    #[test]
    fn pwm_validates_duty_range() {
        assert!(handle_pwm(&LoggingBus, &request("pwm", vec!["1", "101"])).is_empty());
        assert!(handle_pwm(&LoggingBus, &request("pwm", vec!["1", "fast"])).is_empty());
        assert!(handle_pwm(&LoggingBus, &request("pwm", vec!["1", "42.5"])).is_empty());
    }
}
