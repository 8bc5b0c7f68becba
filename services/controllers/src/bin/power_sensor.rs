// power_sensor: Battery pack monitoring and cooling-fan control.

use controllers::duty_from;
use tracing::{error, warn};

const FAN_CHANNEL: u32 = 3;

// Pack temperature above this trips a warning.
const TEMPERATURE_LIMIT_C: f64 = 60.0;

fn main() {
    controllers::run("power_sensor", |peripheral| {
        let keys = peripheral.app().keys().clone();

        {
            let bus = peripheral.bus().clone();
            peripheral.watch(&keys.fan_speed, move |_, value| {
                if let Some(duty) = duty_from(value)
                    && let Err(err) = bus.set_pwm(FAN_CHANNEL, duty)
                {
                    error!(%err, "fan update failed");
                }
            });
        }
        peripheral.watch(&keys.battery_temperature, move |_, value| {
            if let Ok(celsius) = value.parse::<f64>()
                && celsius > TEMPERATURE_LIMIT_C
            {
                warn!(celsius, "battery pack over temperature limit");
            }
        });
    });
}
