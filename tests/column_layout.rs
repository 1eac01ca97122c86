use exampaper_pdf::{
    Column, ColumnGeometry, ColumnLayoutEngine, PageSetup, Placement, Transition,
};

fn a4_geometry() -> ColumnGeometry {
    ColumnGeometry::from_page(&PageSetup::default())
}

/// Deterministic heights between 8 and 120 points.
fn heights(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            8.0 + ((state >> 33) % 113) as f32
        })
        .collect()
}

fn run(geom: ColumnGeometry, blocks: &[f32], gap: f32) -> Vec<Placement> {
    let mut engine = ColumnLayoutEngine::new(geom);
    blocks
        .iter()
        .map(|&h| {
            let p = engine.advance(h);
            engine.commit(h);
            engine.skip(gap);
            p
        })
        .collect()
}

#[test]
fn cursor_stays_inside_the_column() {
    let geom = a4_geometry();
    let mut engine = ColumnLayoutEngine::new(geom);
    for h in heights(400, 7) {
        engine.advance(h);
        engine.commit(h);
        engine.skip(6.0);
        let c = engine.cursor();
        for y in [c.y_left, c.y_right] {
            assert!(y >= geom.content_top && y <= geom.page_bottom, "y {y} outside column");
        }
    }
}

#[test]
fn blocks_fit_unless_marked_oversized() {
    let geom = a4_geometry();
    let blocks = heights(300, 42);
    for (p, h) in run(geom, &blocks, 6.0).iter().zip(&blocks) {
        assert!(p.oversized || p.y + h <= geom.page_bottom + 1e-3);
        assert!(!p.oversized);
        let expected_x = match p.column {
            Column::Left => geom.left_x,
            Column::Right => geom.right_x,
        };
        assert_eq!(p.x, expected_x);
    }
}

#[test]
fn flow_is_monotonic() {
    let placements = run(a4_geometry(), &heights(300, 3), 4.0);
    for pair in placements.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        match b.transition {
            Transition::None => {
                assert_eq!((a.page_index, a.column), (b.page_index, b.column));
                assert!(b.y > a.y);
            }
            Transition::Column => {
                assert_eq!(a.page_index, b.page_index);
                assert_eq!((a.column, b.column), (Column::Left, Column::Right));
            }
            Transition::Page => {
                assert_eq!(b.page_index, a.page_index + 1);
                assert_eq!(b.column, Column::Left);
            }
        }
    }
}

#[test]
fn same_input_same_layout() {
    let blocks = heights(250, 99);
    assert_eq!(
        run(a4_geometry(), &blocks, 5.0),
        run(a4_geometry(), &blocks, 5.0)
    );
}

#[test]
fn both_columns_fill_before_a_page_break() {
    let geom = a4_geometry();
    let placements = run(geom, &vec![50.0; 200], 0.0);
    let per_column = (geom.column_height() / 50.0).floor() as usize;
    let first_page = placements.iter().filter(|p| p.page_index == 0).count();
    assert_eq!(first_page, 2 * per_column);
}

#[test]
fn header_band_only_on_first_page() {
    let geom = a4_geometry();
    let mut engine = ColumnLayoutEngine::new(geom);
    engine.reserve_full_width(120.0);
    assert_eq!(engine.column_top(), geom.content_top + 120.0);

    let first = engine.advance(10.0);
    assert_eq!(first.y, geom.content_top + 120.0);
    engine.commit(10.0);

    let mut last = first;
    while last.page_index == 0 {
        last = engine.advance(200.0);
        engine.commit(200.0);
    }
    assert_eq!(last.y, geom.content_top);
    assert_eq!(engine.column_top(), geom.content_top);
}

#[test]
fn reserve_after_placement_is_ignored() {
    let geom = a4_geometry();
    let mut engine = ColumnLayoutEngine::new(geom);
    engine.advance(30.0);
    engine.commit(30.0);
    engine.reserve_full_width(100.0);
    assert_eq!(engine.column_top(), geom.content_top);
    assert_eq!(engine.cursor().y_left, geom.content_top + 30.0);
}

#[test]
fn oversized_block_never_loops() {
    let geom = a4_geometry();
    let mut engine = ColumnLayoutEngine::new(geom);
    engine.advance(100.0);
    engine.commit(100.0);
    let p = engine.advance(geom.column_height() * 3.0);
    assert!(p.oversized);
    assert_eq!(p.column, Column::Right);
    assert_eq!(p.y, geom.content_top);
    engine.commit(geom.column_height() * 3.0);
    assert_eq!(engine.cursor().y_right, geom.page_bottom);
}
