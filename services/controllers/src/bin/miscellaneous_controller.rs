// miscellaneous_controller: Horn and turn indicators.

use controllers::level_from;
use tracing::error;

const HORN_PIN: u32 = 17;
const LEFT_INDICATOR_PIN: u32 = 22;
const RIGHT_INDICATOR_PIN: u32 = 23;

fn main() {
    controllers::run("miscellaneous_controller", |peripheral| {
        let keys = peripheral.app().keys().clone();

        for (key, pin) in [
            (keys.horn.clone(), HORN_PIN),
            (keys.left_indicator.clone(), LEFT_INDICATOR_PIN),
            (keys.right_indicator.clone(), RIGHT_INDICATOR_PIN),
        ] {
            let bus = peripheral.bus().clone();
            peripheral.watch(&key, move |key, value| {
                if let Err(err) = bus.write_gpio(pin, level_from(value)) {
                    error!(key = %key, %err, "switch update failed");
                }
            });
        }
    });
}
