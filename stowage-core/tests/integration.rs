//! End-to-end tests for the stowage core: templates loaded from TOML, a
//! nested tree exercised through insertion, selection, spoilage, spill,
//! and a full save/load round trip.

use std::sync::Arc;

use stowage_core::config::PocketSetConfig;
use stowage_core::contents::{ContainerTree, VisitResponse};
use stowage_core::item::{Item, ItemType, ItemTypeRegistry};
use stowage_core::pocket::Rejection;
use stowage_core::save::MigrationMap;
use stowage_core::store::SaveStore;
use stowage_core::template::PocketKind;
use stowage_core::types::{Ambient, ItemTypeId, Phase, Position, Volume, Weight};

const BACKPACK_POCKETS: &str = r#"
    [[pockets]]
    kind = "container"
    max_volume = "1 L"
    max_weight = "4 kg"
    watertight = true
    moves = 80

    [[pockets]]
    kind = "container"
    max_volume = "8 L"
    max_weight = "15 kg"
    moves = 120
"#;

const COOLER_POCKETS: &str = r#"
    [[pockets]]
    kind = "container"
    max_volume = "4 L"
    max_weight = "10 kg"
    watertight = true
    rigid = true
    spoil_multiplier = 0.25
"#;

const PISTOL_POCKETS: &str = r#"
    [[pockets]]
    kind = "magazine"
    max_volume = "200 ml"
    max_weight = "1 kg"
    ammo_restriction = ["9mm"]
    rigid = true

    [[pockets]]
    kind = "mod_slot"
    max_volume = "500 ml"
    max_weight = "1 kg"
"#;

fn build_registry() -> ItemTypeRegistry {
    let mut registry = ItemTypeRegistry::new();

    let backpack_templates = PocketSetConfig::from_toml(BACKPACK_POCKETS)
        .expect("backpack toml")
        .into_templates()
        .expect("backpack templates");
    registry.register(
        ItemType::new(
            "backpack",
            Volume::from_milliliters(600),
            Weight::from_grams(800),
        )
        .with_pockets(backpack_templates),
    );

    let cooler_templates = PocketSetConfig::from_toml(COOLER_POCKETS)
        .expect("cooler toml")
        .into_templates()
        .expect("cooler templates");
    registry.register(
        ItemType::new(
            "cooler",
            Volume::from_liters(5),
            Weight::from_kilograms(2),
        )
        .with_pockets(cooler_templates),
    );

    let pistol_templates = PocketSetConfig::from_toml(PISTOL_POCKETS)
        .expect("pistol toml")
        .into_templates()
        .expect("pistol templates");
    registry.register(
        ItemType::new(
            "pistol",
            Volume::from_milliliters(450),
            Weight::from_grams(900),
        )
        .with_pockets(pistol_templates),
    );

    registry.register(ItemType::new(
        "canteen_water",
        Volume::from_milliliters(500),
        Weight::from_grams(500),
    ).with_phase(Phase::Liquid));
    registry.register(
        ItemType::new(
            "jerky",
            Volume::from_milliliters(250),
            Weight::from_grams(200),
        )
        .with_spoils_in(20_000),
    );
    registry.register(
        ItemType::new(
            "9mm_fmj",
            Volume::from_milliliters(250),
            Weight::from_grams(400),
        )
        .with_charges(50)
        .with_ammo_type("9mm"),
    );
    registry.register(
        ItemType::new(
            "suppressor",
            Volume::from_milliliters(120),
            Weight::from_grams(350),
        )
        .gunmod(),
    );
    registry.register(ItemType::new(
        "tent_pole",
        Volume::from_liters(2),
        Weight::from_kilograms(1),
    ));
    registry
}

fn instantiate(registry: &ItemTypeRegistry, id: &str) -> Item {
    Item::new(Arc::clone(
        registry.get(&ItemTypeId::new(id)).expect("registered type"),
    ))
}

#[test]
fn backpack_routes_items_to_sensible_pockets() {
    let registry = build_registry();
    let mut backpack = instantiate(&registry, "backpack");
    let tree = backpack.contents_mut().expect("tree");

    // The liquid can only go into the watertight pocket.
    tree.insert_item(instantiate(&registry, "canteen_water"), PocketKind::Container)
        .expect("water stored");
    assert_eq!(
        tree.pockets()[0].contains_volume(),
        Volume::from_milliliters(500)
    );

    // A bulky solid lands in the big pocket: the small one cannot hold it.
    tree.insert_item(instantiate(&registry, "tent_pole"), PocketKind::Container)
        .expect("pole stored");
    assert_eq!(tree.pockets()[1].contains_volume(), Volume::from_liters(2));

    // A small solid prefers the tighter fit (1 L pocket has 500 ml left,
    // the 8 L pocket has 6 L).
    tree.insert_item(instantiate(&registry, "jerky"), PocketKind::Container)
        .expect("jerky stored");
    assert_eq!(tree.pockets()[0].num_item_stacks(), 2);
}

#[test]
fn pistol_magazine_and_mod_slot() {
    let registry = build_registry();
    let mut pistol = instantiate(&registry, "pistol");
    let tree = pistol.contents_mut().expect("tree");

    let rounds = instantiate(&registry, "9mm_fmj").with_charges(30);
    tree.insert_item(rounds, PocketKind::Magazine).expect("loaded");

    // Wrong ammo is classified, not panicked. The suppressor fits the
    // magazine pocket's volume, so the ammo restriction is what fires.
    let not_ammo = instantiate(&registry, "suppressor");
    let err = tree
        .insert_item(not_ammo, PocketKind::Magazine)
        .expect_err("a suppressor is not ammo");
    match err {
        stowage_core::contents::InsertError::Rejected(failure) => {
            assert_eq!(failure.rejection, Rejection::WrongAmmoType);
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    tree.insert_item(instantiate(&registry, "suppressor"), PocketKind::ModSlot)
        .expect("mod installed");
    assert_eq!(tree.gunmods().len(), 1);

    let first = tree.first_ammo().expect("ammo visible");
    assert_eq!(first.type_id(), &ItemTypeId::new("9mm_fmj"));
    assert_eq!(tree.ammo_consume(12), 12);
    assert_eq!(tree.first_ammo().expect("ammo left").charges(), 18);
}

#[test]
fn cooler_slows_spoilage_of_nested_food() {
    let registry = build_registry();
    let mut cooler = instantiate(&registry, "cooler");
    cooler
        .contents_mut()
        .expect("tree")
        .insert_item(instantiate(&registry, "jerky"), PocketKind::Container)
        .expect("stored");
    let mut backpack = instantiate(&registry, "backpack");
    backpack
        .contents_mut()
        .expect("tree")
        .insert_item(instantiate(&registry, "jerky"), PocketKind::Container)
        .expect("stored");

    // Half the shelf life at room temperature.
    let ambient = Ambient::room(10_000);
    assert!(cooler.contents_mut().expect("tree").process(&ambient).is_empty());
    assert!(backpack.contents_mut().expect("tree").process(&ambient).is_empty());

    let chilled = cooler.contents().expect("tree").all_items_top()[0];
    let warm = backpack.contents().expect("tree").all_items_top()[0];
    assert!(
        chilled.rot() < warm.rot(),
        "the 0.25x cooler pocket must slow rot: {} vs {}",
        chilled.rot(),
        warm.rot()
    );
}

#[test]
fn forced_overload_spills_largest_first_and_loses_nothing() {
    let registry = build_registry();
    let mut backpack = instantiate(&registry, "backpack");
    let tree = backpack.contents_mut().expect("tree");

    // Force the 8 L pocket over budget with unchecked adds, as a capacity
    // reduction would: four 2 L poles plus the jerky.
    for _ in 0..4 {
        tree.pocket_mut(1)
            .expect("pocket")
            .add_unchecked(instantiate(&registry, "tent_pole"));
    }
    tree.pocket_mut(1)
        .expect("pocket")
        .add_unchecked(instantiate(&registry, "jerky"));
    let before = tree.total_contained_volume();
    assert!(before > tree.pockets()[1].volume_capacity());

    let spills = tree.overflow(Position::new(10, 4, 0));
    assert_eq!(spills.len(), 1);
    assert_eq!(spills[0].item.type_id(), &ItemTypeId::new("tent_pole"));
    assert_eq!(spills[0].position, Position::new(10, 4, 0));

    let spilled_volume: Volume = spills.iter().map(|s| s.item.volume()).sum();
    assert_eq!(
        tree.total_contained_volume() + spilled_volume,
        before,
        "nothing may vanish silently during a spill"
    );
    assert!(tree.pockets()[1].contains_volume() <= tree.pockets()[1].volume_capacity());
}

#[test]
fn visitor_walks_nested_trees_in_order() {
    let registry = build_registry();
    let mut backpack = instantiate(&registry, "backpack");
    let tree = backpack.contents_mut().expect("tree");

    let mut pistol = instantiate(&registry, "pistol");
    pistol
        .contents_mut()
        .expect("tree")
        .insert_item(
            instantiate(&registry, "9mm_fmj").with_charges(10),
            PocketKind::Magazine,
        )
        .expect("loaded");
    tree.insert_item(pistol, PocketKind::Container).expect("fits");

    let mut seen = Vec::new();
    let response = tree.visit_contents(&mut |item, parent| {
        seen.push((
            item.type_id().0.clone(),
            parent.map(|p| p.type_id().0.clone()),
        ));
        VisitResponse::Continue
    });
    assert_eq!(response, VisitResponse::Continue);
    assert_eq!(
        seen,
        vec![
            ("pistol".to_string(), None),
            ("9mm_fmj".to_string(), Some("pistol".to_string())),
        ]
    );
}

#[test]
fn save_store_round_trip_with_migration() {
    let registry = build_registry();
    let store = SaveStore::open_in_memory().expect("open");

    let mut backpack = instantiate(&registry, "backpack");
    backpack
        .contents_mut()
        .expect("tree")
        .insert_item(instantiate(&registry, "jerky"), PocketKind::Container)
        .expect("fits");
    store.save_item(&backpack).expect("save");

    // Plain reload.
    let loaded = store
        .load_item(backpack.id(), &registry, &MigrationMap::new())
        .expect("load")
        .expect("Some");
    assert_eq!(loaded.volume(), backpack.volume());
    assert_eq!(loaded.weight(), backpack.weight());

    // Reload into a world where "jerky" was retired.
    let mut slim_registry = build_registry();
    slim_registry.register(ItemType::new(
        "dried_meat",
        Volume::from_milliliters(250),
        Weight::from_grams(200),
    ));
    let slim_registry = {
        // Rebuild without "jerky" by registering over a fresh registry.
        let mut fresh = ItemTypeRegistry::new();
        for id in ["backpack", "dried_meat"] {
            let ty = slim_registry.get(&ItemTypeId::new(id)).expect("type");
            fresh.register((**ty).clone());
        }
        fresh
    };

    let missing = store.load_item(backpack.id(), &slim_registry, &MigrationMap::new());
    assert!(missing.is_err(), "retired type without migration must fail");

    let mut migrations = MigrationMap::new();
    migrations.add("jerky", "dried_meat");
    let migrated = store
        .load_item(backpack.id(), &slim_registry, &migrations)
        .expect("load")
        .expect("Some");
    assert_eq!(
        migrated.contents().expect("tree").all_items_top()[0].type_id(),
        &ItemTypeId::new("dried_meat")
    );
}

#[test]
fn legacy_flat_list_then_best_pocket_stays_deterministic() {
    let registry = build_registry();
    let templates = PocketSetConfig::from_toml(BACKPACK_POCKETS)
        .expect("toml")
        .into_templates()
        .expect("templates");

    let items = vec![
        instantiate(&registry, "jerky"),
        instantiate(&registry, "tent_pole"),
    ];
    let tree = ContainerTree::from_legacy_items(&templates, items).expect("adapter");

    let probe = instantiate(&registry, "jerky");
    let first = tree.best_pocket(&probe, false).expect("candidate");
    let second = tree.best_pocket(&probe, false).expect("candidate");
    assert_eq!(first.volume_capacity(), second.volume_capacity());
    assert_eq!(first.remaining_volume(), second.remaining_volume());
}
