use super::*;

#[test]
fn ids_are_stable_and_distinct() {
    let a = ElementDomain::line("dots", 16, 7);
    let b = ElementDomain::line("dots", 16, 7);
    assert_eq!(a.ids(), b.ids());
    let mut sorted = a.ids().to_vec();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 16);
}

#[test]
fn ids_depend_on_owner_not_on_seed() {
    let a = ElementDomain::line("dots", 4, 1);
    let b = ElementDomain::line("dots", 4, 2);
    let c = ElementDomain::line("other", 4, 1);
    assert_eq!(a.ids(), b.ids());
    assert_ne!(a.ids(), c.ids());
}

#[test]
fn growing_a_line_keeps_existing_ids() {
    let a = ElementDomain::line("dots", 4, 0);
    let b = ElementDomain::line("dots", 8, 0);
    assert_eq!(a.ids(), &b.ids()[..4]);
    assert_ne!(a.identity(), b.identity());
}

#[test]
fn grid_positions_are_row_major() {
    let g = ElementDomain::grid("g", 2, 3, 10.0, 0);
    assert_eq!(g.count(), 6);
    assert_eq!(g.position(0), Vec2::new(0.0, 0.0));
    assert_eq!(g.position(2), Vec2::new(20.0, 0.0));
    assert_eq!(g.position(4), Vec2::new(10.0, 10.0));
}

#[test]
fn index01_spans_unit_interval() {
    let d = ElementDomain::line("d", 5, 0);
    assert_eq!(d.index01(0), 0.0);
    assert_eq!(d.index01(4), 1.0);
    assert_eq!(ElementDomain::line("one", 1, 0).index01(0), 0.0);
}

#[test]
fn random_is_seeded_and_in_range() {
    let a = ElementDomain::line("d", 8, 1);
    let b = ElementDomain::line("d", 8, 2);
    for i in 0..8 {
        assert!((0.0..1.0).contains(&a.random01(i)));
        assert_eq!(a.random01(i), ElementDomain::line("d", 8, 1).random01(i));
    }
    assert!((0..8).any(|i| a.random01(i) != b.random01(i)));
}
