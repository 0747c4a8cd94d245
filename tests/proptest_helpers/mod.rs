#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use scanfuse::geometry::{Coord, Dimensions, Pixel};

pub const EPS: f64 = 1e-9;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_coord() -> impl Strategy<Value = Coord<Pixel>> {
    (-2000.0f64..2000.0, -2000.0f64..2000.0).prop_map(|(x, y)| Coord::new(x, y))
}

/// Four arbitrary source-pixel points, in no particular order.
pub fn arb_quad() -> impl Strategy<Value = Vec<Coord<Pixel>>> {
    prop::collection::vec(arb_coord(), 4)
}

/// Dimensions where either side may be zero.
pub fn arb_dimensions() -> impl Strategy<Value = Dimensions> {
    (
        prop_oneof![Just(0.0), 1.0f64..4000.0],
        prop_oneof![Just(0.0), 1.0f64..4000.0],
    )
        .prop_map(|(w, h)| Dimensions::new(w, h))
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPS * a.abs().max(b.abs()).max(1.0)
}
