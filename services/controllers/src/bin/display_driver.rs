// display_driver: Backlight and headlight control.

use controllers::{duty_from, level_from};
use tracing::error;

const BACKLIGHT_CHANNEL: u32 = 2;
const HEADLIGHT_PIN: u32 = 5;

fn main() {
    controllers::run("display_driver", |peripheral| {
        let keys = peripheral.app().keys().clone();

        {
            let bus = peripheral.bus().clone();
            peripheral.watch(&keys.backlight, move |_, value| {
                if let Some(duty) = duty_from(value)
                    && let Err(err) = bus.set_pwm(BACKLIGHT_CHANNEL, duty)
                {
                    error!(%err, "backlight update failed");
                }
            });
        }
        {
            let bus = peripheral.bus().clone();
            peripheral.watch(&keys.headlights, move |_, value| {
                if let Err(err) = bus.write_gpio(HEADLIGHT_PIN, level_from(value)) {
                    error!(%err, "headlight update failed");
                }
            });
        }
    });
}
