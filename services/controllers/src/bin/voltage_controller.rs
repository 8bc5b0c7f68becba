// voltage_controller: Pack voltage supervision.

use tracing::{error, warn};

const CONTACTOR_PIN: u32 = 27;

// Open the contactor outside this window.
const MIN_PACK_VOLTS: f64 = 72.0;
const MAX_PACK_VOLTS: f64 = 150.0;

fn main() {
    controllers::run("voltage_controller", |peripheral| {
        let keys = peripheral.app().keys().clone();

        let bus = peripheral.bus().clone();
        peripheral.watch(&keys.battery_voltage, move |_, value| {
            let Ok(volts) = value.parse::<f64>() else {
                warn!(value = %value, "unreadable pack voltage");
                return;
            };
            let in_window = (MIN_PACK_VOLTS..=MAX_PACK_VOLTS).contains(&volts);
            if !in_window {
                warn!(volts, "pack voltage out of window; opening contactor");
            }
            if let Err(err) = bus.write_gpio(CONTACTOR_PIN, in_window) {
                error!(%err, "contactor update failed");
            }
        });
    });
}
