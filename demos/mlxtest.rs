//! Exercise an MLX90614 on a Raspberry Pi: print every temperature source in
//! every unit once a second, plus the chip ID and current filter settings.
//!
//! Run with `cargo run --example mlxtest --features rppal`.

use std::time::Duration;

use anyhow::Context;
use mlx90614::{Mlx90614, RppalBus, TempSource, TempUnit, ThreadDelay};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus = RppalBus::new().context("failed to open i2c bus")?;
    let mut dev = Mlx90614::new(bus);
    let mut delay = ThreadDelay;

    let id = dev.read_id(&mut delay);
    dev.status().context("failed to read chip id")?;
    info!("chip id {id:#018x}");

    let iir = dev.iir_coeff(&mut delay);
    let fir = dev.fir_coeff(&mut delay);
    let emissivity = dev.emissivity(&mut delay);
    info!("iir setting {iir}, fir setting {fir}, emissivity {emissivity:.4}");

    loop {
        for (label, source) in [
            ("ambient", TempSource::Ambient),
            ("object 1", TempSource::Object1),
            ("object 2", TempSource::Object2),
        ] {
            let k = dev.read_temp(source, TempUnit::Kelvin, &mut delay);
            let c = dev.read_temp(source, TempUnit::Celsius, &mut delay);
            let f = dev.read_temp(source, TempUnit::Fahrenheit, &mut delay);
            match dev.status() {
                Ok(()) => info!("{label}: {k:.2} K / {c:.2} C / {f:.2} F"),
                Err(err) => warn!("{label}: read failed: {err}"),
            }
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}
