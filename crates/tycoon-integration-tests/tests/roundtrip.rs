//! Whole-stream round-trip tests through the real game registry.

use tycoon_saveload::pool::NULL_REF;
use tycoon_saveload::stream::SAVEGAME_VERSION;
use tycoon_world::test_utils::{empty_world, sample_world};
use tycoon_world::world::registry;

// ---------------------------------------------------------------------------
// Test 1: Save and load preserves every entity, including pool gaps
// ---------------------------------------------------------------------------
#[test]
fn roundtrip_sample_world() {
    let reg = registry().unwrap();
    let world = sample_world();
    let bytes = reg.save_stream(&world).unwrap();

    let loaded = reg.load_stream(&bytes).unwrap();
    assert_eq!(loaded.report.version, SAVEGAME_VERSION);
    assert!(loaded.report.clamps.is_empty());

    assert_eq!(loaded.world.tick, world.tick);
    assert_eq!(loaded.world.calendar_day, world.calendar_day);
    assert_eq!(loaded.world.settings, world.settings);
    assert_eq!(loaded.world.gamelog, world.gamelog);

    // Pool contents and indices survive exactly, gaps included.
    for (index, company) in world.companies.iter() {
        let mut expected = company.clone();
        // The vehicle count cache is recomputed, not persisted.
        expected.vehicle_count = world
            .vehicles
            .iter()
            .filter(|(_, v)| v.owner == index)
            .count() as u32;
        assert_eq!(loaded.world.companies.get(index), Some(&expected));
    }
    for (index, vehicle) in world.vehicles.iter() {
        assert_eq!(loaded.world.vehicles.get(index), Some(vehicle));
    }
    for (index, list) in world.order_lists.iter() {
        assert_eq!(loaded.world.order_lists.get(index), Some(list));
    }
    assert!(!loaded.world.vehicles.contains(2), "freed slot must stay free");
}

// ---------------------------------------------------------------------------
// Test 2: Save, load, save again yields identical bytes
// ---------------------------------------------------------------------------
#[test]
fn roundtrip_is_stable() {
    let reg = registry().unwrap();
    let bytes = reg.save_stream(&sample_world()).unwrap();
    let loaded = reg.load_stream(&bytes).unwrap();
    let again = reg.save_stream(&loaded.world).unwrap();
    assert_eq!(bytes, again);
}

// ---------------------------------------------------------------------------
// Test 3: An empty world round-trips and elides the gamelog chunk
// ---------------------------------------------------------------------------
#[test]
fn roundtrip_empty_world() {
    let reg = registry().unwrap();
    let bytes = reg.save_stream(&empty_world()).unwrap();

    let info = reg.check_stream(&bytes).unwrap();
    assert!(info.chunks.iter().all(|c| c.tag != "GLOG"));

    let loaded = reg.load_stream(&bytes).unwrap();
    assert!(loaded.world.companies.is_empty());
    assert!(loaded.world.vehicles.is_empty());
    assert!(loaded.world.gamelog.is_empty());
    assert_eq!(loaded.world.tick, 0);
}

// ---------------------------------------------------------------------------
// Test 4: Forward references and full cycles resolve
// ---------------------------------------------------------------------------
#[test]
fn roundtrip_cyclic_consist_chain() {
    use tycoon_world::company::Company;
    use tycoon_world::vehicle::Vehicle;
    use tycoon_world::world::World;

    let reg = registry().unwrap();
    let mut world = World::default();
    let owner = world.companies.alloc(Company {
        name: "Circular".into(),
        ..Company::default()
    });

    // A -> B -> C -> A: every link is a forward reference at load time
    // until the last record lands.
    for i in 0..3u32 {
        world.vehicles.insert_at(
            i,
            Vehicle {
                name: format!("car-{i}"),
                owner,
                next: (i + 1) % 3,
                ..Vehicle::default()
            },
        );
    }

    let bytes = reg.save_stream(&world).unwrap();
    let loaded = reg.load_stream(&bytes).unwrap();
    for i in 0..3u32 {
        assert_eq!(loaded.world.vehicles.get(i).unwrap().next, (i + 1) % 3);
    }

    // Loading the same bytes again is byte-for-byte repeatable: the
    // fix-up pass leaves surrogates as plain indices.
    let again = reg.load_stream(&bytes).unwrap();
    assert_eq!(
        reg.save_stream(&loaded.world).unwrap(),
        reg.save_stream(&again.world).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Test 5: Running the reference fix-up again on a loaded world is a no-op
// ---------------------------------------------------------------------------
#[test]
fn roundtrip_refixup_is_noop() {
    use tycoon_saveload::chunk::Chunk;
    use tycoon_saveload::feature::LoadedFeatures;
    use tycoon_saveload::table::LoadContext;
    use tycoon_world::company::CompanyChunk;
    use tycoon_world::order::OrderChunk;
    use tycoon_world::vehicle::VehicleChunk;

    let reg = registry().unwrap();
    let bytes = reg.save_stream(&sample_world()).unwrap();
    let mut loaded = reg.load_stream(&bytes).unwrap();
    let before = reg.save_stream(&loaded.world).unwrap();

    // References stay plain pool indices after loading, so a second
    // validation pass must succeed and change nothing.
    let ctx = LoadContext::new(SAVEGAME_VERSION, LoadedFeatures::new());
    VehicleChunk::new()
        .fix_references(&mut loaded.world, &ctx)
        .unwrap();
    OrderChunk::new()
        .fix_references(&mut loaded.world, &ctx)
        .unwrap();
    CompanyChunk::new()
        .fix_references(&mut loaded.world, &ctx)
        .unwrap();

    assert_eq!(reg.save_stream(&loaded.world).unwrap(), before);
}

// ---------------------------------------------------------------------------
// Test 6: Null references stay null through a round-trip
// ---------------------------------------------------------------------------
#[test]
fn roundtrip_null_references() {
    let reg = registry().unwrap();
    let world = sample_world();
    let bytes = reg.save_stream(&world).unwrap();
    let loaded = reg.load_stream(&bytes).unwrap();

    let relief = loaded
        .world
        .vehicles
        .iter()
        .find(|(_, v)| v.name == "Relief")
        .map(|(_, v)| v)
        .unwrap();
    assert_eq!(relief.next, NULL_REF);
    assert_eq!(relief.orders, NULL_REF);
}
