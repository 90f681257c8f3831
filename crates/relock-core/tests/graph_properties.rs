//! Graph and layout properties checked through the public API.

use relock_core::pkg::{
    invert, project, resolve_all, Manifest, NoObserver, PackageRecord, Placement, Resolution,
    Snapshot, Source,
};

fn record(name: &str, version: &str, ranges: &[&str], deps: &[(&str, &str)]) -> PackageRecord {
    let mut r = PackageRecord::new(name, version, Source::registry());
    for range in ranges {
        r.add_range(range);
    }
    for (n, v) in deps {
        r.dependencies.insert((*n).to_string(), (*v).to_string());
    }
    r
}

fn snapshot(deps: &[(&str, &str)], dev: &[(&str, &str)], records: Vec<PackageRecord>) -> Snapshot {
    let mut manifest = Manifest {
        name: "app".into(),
        version: Some("1.0.0".into()),
        ..Manifest::default()
    };
    for (n, v) in deps {
        manifest.dependencies.insert((*n).into(), (*v).into());
    }
    for (n, v) in dev {
        manifest.dev_dependencies.insert((*n).into(), (*v).into());
    }
    let mut snap = Snapshot::new(manifest);
    for r in records {
        snap.upsert(r);
    }
    snap
}

fn layout(snap: &Snapshot) -> (Resolution, Placement) {
    let res = resolve_all(snap, &NoObserver).unwrap();
    let placement = project(snap, &res, &NoObserver).unwrap();
    (res, placement)
}

fn assert_lookup_correct(res: &Resolution, placement: &Placement) {
    for entry in res.tree.iter().filter(|e| e.path.len() > 1) {
        let parent = entry.parent_path_key().unwrap();
        let from = placement.location(&parent).unwrap();
        let (_, placed) = placement
            .lookup(from, entry.name())
            .unwrap_or_else(|| panic!("{} not visible from {from}", entry.name()));
        assert_eq!(placed.key, entry.key, "lookup of {} from {from}", entry.name());
    }
}

/// A mid-sized graph with conflicts at several depths, a cycle and a dev tool.
fn tangled() -> Snapshot {
    snapshot(
        &[("express", "^4.18.0"), ("debug", "^4.3.0"), ("ms", "^2.1.3")],
        &[("jest", "^29.0.0")],
        vec![
            record(
                "express",
                "4.18.2",
                &["^4.18.0"],
                &[("debug", "2.6.9"), ("body-parser", "1.20.1"), ("ms", "2.0.0")],
            ),
            record("body-parser", "1.20.1", &["1.20.1"], &[("debug", "2.6.9")]),
            record("debug", "2.6.9", &["2.6.9"], &[("ms", "2.0.0")]),
            record("debug", "4.3.4", &["^4.3.0", "^4.1.0"], &[("ms", "2.1.2")]),
            record("ms", "2.0.0", &["2.0.0"], &[]),
            record("ms", "2.1.2", &["2.1.2"], &[]),
            record("ms", "2.1.3", &["^2.1.3"], &[]),
            record("jest", "29.7.0", &["^29.0.0"], &[("jest-cli", "^29.7.0")]),
            record("jest-cli", "29.7.0", &["^29.7.0"], &[("jest", "^29.0.0"), ("debug", "^4.1.0")]),
        ],
    )
}

#[test]
fn test_round_trip_restores_every_range() {
    let snap = tangled();
    let (_, placement) = layout(&snap);
    let inverted = invert(&placement.to_physical(&snap).unwrap()).unwrap();

    assert_eq!(inverted.entries.len(), snap.entries.len());
    for (key, original) in &snap.entries {
        assert_eq!(inverted.entries[key].ranges, original.ranges, "ranges of {key}");
        assert_eq!(inverted.entries[key].dependencies, original.dependencies);
    }
}

#[test]
fn test_every_edge_resolves_by_ancestor_lookup() {
    let snap = tangled();
    let (res, placement) = layout(&snap);
    assert_lookup_correct(&res, &placement);

    // the top-level debug/ms are the root's own picks
    assert_eq!(placement.get("node_modules/debug").unwrap().key, "debug@4.3.4");
    assert_eq!(placement.get("node_modules/ms").unwrap().key, "ms@2.1.3");
}

#[test]
fn test_resolve_twice_is_identical() {
    let snap = tangled();
    let first = resolve_all(&snap, &NoObserver).unwrap();
    let second = resolve_all(&snap, &NoObserver).unwrap();
    assert_eq!(first.path_keys(), second.path_keys());
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.production, second.production);
}

#[test]
fn test_cycle_terminates_with_both_edges() {
    let snap = tangled();
    let res = resolve_all(&snap, &NoObserver).unwrap();
    let has = |from: &str, to: &str| res.edges.iter().any(|e| e.from == from && e.to == to);
    assert!(has("jest@29.7.0", "jest-cli@29.7.0"));
    assert!(has("jest-cli@29.7.0", "jest@29.7.0"));
}

#[test]
fn test_production_membership_survives_dev_paths() {
    let snap = tangled();
    let res = resolve_all(&snap, &NoObserver).unwrap();
    // debug@4.3.4 is both a root production dependency and reached via jest-cli
    assert!(res.is_production("debug@4.3.4"));
    assert!(!res.is_production("jest@29.7.0"));
    assert!(!res.is_production("jest-cli@29.7.0"));

    let (_, placement) = layout(&snap);
    assert!(placement.get("node_modules/jest").unwrap().dev);
    assert!(!placement.get("node_modules/debug").unwrap().dev);

    let mut without_dev = snap.clone();
    without_dev.manifest.dev_dependencies.clear();
    without_dev
        .get_mut("")
        .unwrap()
        .dev_dependencies
        .clear();
    let res = resolve_all(&without_dev, &NoObserver).unwrap();
    assert!(res.is_production("debug@4.3.4"));
}

#[test]
fn test_nested_major_lands_under_its_consumer() {
    let snap = snapshot(
        &[("a", "^1")],
        &[],
        vec![
            record("a", "1.4.0", &["^1"], &[("x", "^1")]),
            record("x", "1.0.0", &["^1"], &[("a", "^2")]),
            record("a", "2.0.0", &["^2"], &[]),
        ],
    );
    let (res, placement) = layout(&snap);
    assert_eq!(placement.get("node_modules/a").unwrap().key, "a@1.4.0");
    assert_eq!(placement.get("node_modules/x").unwrap().key, "x@1.0.0");
    assert_eq!(
        placement.get("node_modules/x/node_modules/a").unwrap().key,
        "a@2.0.0"
    );
    assert_lookup_correct(&res, &placement);

    let inverted = invert(&placement.to_physical(&snap).unwrap()).unwrap();
    assert!(inverted.entries["a@1.4.0"].ranges.contains("^1"));
    assert!(inverted.entries["a@2.0.0"].ranges.contains("^2"));
    assert!(!inverted.entries["a@2.0.0"].ranges.contains("^1"));
}

#[test]
fn test_shared_dependency_is_placed_once() {
    let snap = snapshot(
        &[("b", "^1"), ("c", "^1")],
        &[],
        vec![
            record("b", "1.0.0", &["^1"], &[("d", "^3")]),
            record("c", "1.0.0", &["^1"], &[("d", "^3")]),
            record("d", "3.1.0", &["^3"], &[]),
        ],
    );
    let (res, placement) = layout(&snap);
    let copies: Vec<_> = placement
        .entries
        .iter()
        .filter(|(_, p)| p.key == "d@3.1.0")
        .map(|(path, _)| path.as_str())
        .collect();
    assert_eq!(copies, vec!["node_modules/d"]);
    assert_eq!(placement.lookup("node_modules/b", "d").unwrap().0, "node_modules/d");
    assert_eq!(placement.lookup("node_modules/c", "d").unwrap().0, "node_modules/d");
    assert_lookup_correct(&res, &placement);
}

#[test]
fn test_missing_record_fails_before_layout() {
    let snap = snapshot(&[("a", "^1")], &[], vec![record("a", "1.0.0", &["^1"], &[("gone", "^9")])]);
    let err = resolve_all(&snap, &NoObserver).unwrap_err();
    assert_eq!(err.code(), "LOCK_INCONSISTENT_SNAPSHOT");
    assert!(err.to_string().contains("gone@^9"));
}

#[test]
fn test_nested_conflict_shapes_place_and_resolve() {
    let shapes: Vec<(&str, Snapshot)> = vec![
        (
            "pending need below a nested consumer",
            snapshot(
                &[("a", "^2"), ("c", "^1"), ("z", "^2")],
                &[],
                vec![
                    record("a", "2.0.0", &["^2"], &[]),
                    record("a", "1.0.0", &["^1"], &[("z", "^2")]),
                    record("c", "1.0.0", &["^1"], &[("a", "^1"), ("z", "^1")]),
                    record("z", "2.0.0", &["^2"], &[]),
                    record("z", "1.0.0", &["^1"], &[]),
                ],
            ),
        ),
        (
            "alternating majors down a chain",
            snapshot(
                &[("a", "^1")],
                &[],
                vec![
                    record("a", "1.0.0", &["^1"], &[("b", "^1")]),
                    record("b", "1.0.0", &["^1"], &[("a", "^2")]),
                    record("a", "2.0.0", &["^2"], &[("b", "^2")]),
                    record("b", "2.0.0", &["^2"], &[]),
                ],
            ),
        ),
        (
            "cousins with their own majors",
            snapshot(
                &[("p", "^1"), ("q", "^1"), ("s", "^3")],
                &[],
                vec![
                    record("p", "1.0.0", &["^1"], &[("r", "^1")]),
                    record("q", "1.0.0", &["^1"], &[("r", "^2")]),
                    record("r", "1.0.0", &["^1"], &[("s", "^1")]),
                    record("r", "2.0.0", &["^2"], &[("s", "^2")]),
                    record("s", "1.0.0", &["^1"], &[]),
                    record("s", "2.0.0", &["^2"], &[]),
                    record("s", "3.0.0", &["^3"], &[]),
                ],
            ),
        ),
        (
            "placed need blocks an intermediate directory",
            snapshot(
                &[("a", "^1"), ("b", "^2"), ("d", "^2"), ("x", "^2")],
                &[],
                vec![
                    record("a", "1.0.0", &["^1"], &[("b", "^1"), ("x", "^1")]),
                    record("b", "1.0.0", &["^1"], &[("d", "^2")]),
                    record("b", "2.0.0", &["^2"], &[]),
                    record("x", "1.0.0", &["^1"], &[("d", "^1")]),
                    record("x", "2.0.0", &["^2"], &[]),
                    record("d", "1.0.0", &["^1"], &[]),
                    record("d", "2.0.0", &["^2"], &[]),
                ],
            ),
        ),
        (
            "cycle through a nested major",
            snapshot(
                &[("a", "^1"), ("b", "^2")],
                &[],
                vec![
                    record("a", "1.0.0", &["^1"], &[("b", "^1")]),
                    record("b", "1.0.0", &["^1"], &[("a", "^1")]),
                    record("b", "2.0.0", &["^2"], &[]),
                ],
            ),
        ),
        ("tangled", tangled()),
    ];

    for (label, snap) in shapes {
        let res = resolve_all(&snap, &NoObserver).unwrap_or_else(|e| panic!("{label}: {e}"));
        let placement = project(&snap, &res, &NoObserver).unwrap_or_else(|e| panic!("{label}: {e}"));
        assert_lookup_correct(&res, &placement);

        let inverted = invert(&placement.to_physical(&snap).unwrap()).unwrap();
        for (key, original) in &snap.entries {
            assert_eq!(inverted.entries[key].ranges, original.ranges, "{label}: {key}");
        }
    }
}
