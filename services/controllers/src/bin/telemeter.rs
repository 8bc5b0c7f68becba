// telemeter: Periodic state snapshots for the telemetry downlink.

use std::time::Duration;

const DEFAULT_TELEMETRY_PERIOD: Duration = Duration::from_secs(1);

fn main() {
    controllers::run("telemeter", |peripheral| {
        controllers::start_telemetry(peripheral.app(), DEFAULT_TELEMETRY_PERIOD);
    });
}
