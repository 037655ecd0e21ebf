//! Save a sample world, reload it, and print the diagnostics reports.
//!
//! ```sh
//! cargo run -p tycoon-world --example save_roundtrip --features test-utils
//! ```

use tycoon_world::test_utils::sample_world;
use tycoon_world::world::registry;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let reg = registry()?;
    let world = sample_world();

    let bytes = reg.save_stream(&world)?;
    println!("saved {} bytes", bytes.len());

    let info = reg.check_stream(&bytes)?;
    println!("{}", info.to_json()?);

    let loaded = reg.load_stream(&bytes)?;
    println!("{}", loaded.report.to_json()?);
    println!(
        "loaded {} companies, {} vehicles, {} order lists at tick {}",
        loaded.world.companies.len(),
        loaded.world.vehicles.len(),
        loaded.world.order_lists.len(),
        loaded.world.tick,
    );
    Ok(())
}
