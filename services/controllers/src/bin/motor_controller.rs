// motor_controller: Drives the traction motor from replicated state.

use controllers::{duty_from, level_from};
use tracing::error;

// PWM channels and GPIO pins on the motor board.
const THROTTLE_CHANNEL: u32 = 0;
const REGEN_CHANNEL: u32 = 1;
const DIRECTION_PIN: u32 = 12;

fn main() {
    controllers::run("motor_controller", |peripheral| {
        let keys = peripheral.app().keys().clone();

        {
            let bus = peripheral.bus().clone();
            peripheral.watch(&keys.motor_speed, move |_, value| {
                if let Some(duty) = duty_from(value)
                    && let Err(err) = bus.set_pwm(THROTTLE_CHANNEL, duty)
                {
                    error!(%err, "throttle update failed");
                }
            });
        }
        {
            let bus = peripheral.bus().clone();
            peripheral.watch(&keys.regen_strength, move |_, value| {
                if let Some(duty) = duty_from(value)
                    && let Err(err) = bus.set_pwm(REGEN_CHANNEL, duty)
                {
                    error!(%err, "regen update failed");
                }
            });
        }
        {
            let bus = peripheral.bus().clone();
            peripheral.watch(&keys.direction, move |_, value| {
                let forward = value == "forward" || level_from(value);
                if let Err(err) = bus.write_gpio(DIRECTION_PIN, forward) {
                    error!(%err, "direction update failed");
                }
            });
        }
    });
}
