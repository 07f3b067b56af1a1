//! Property tests for folding join rows into order views.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use order_ingest_core::OrderRow;
use order_ingest_service::query::fold_rows;
use proptest::prelude::*;
use std::collections::HashSet;

fn row_strategy() -> impl Strategy<Value = OrderRow> {
    (1_i64..6, proptest::option::of(1_i64..20), 1_i32..5).prop_map(|(id, product_id, quantity)| {
        OrderRow {
            id,
            uuid: format!("u{id}"),
            customer_id: id * 10,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            total: 1.0,
            customer_name: Some(format!("c{id}")),
            product_id,
            quantity: product_id.map(|_| quantity),
        }
    })
}

proptest! {
    #[test]
    fn one_view_per_order_in_first_encounter_order(rows in prop::collection::vec(row_strategy(), 0..40)) {
        let mut seen = HashSet::new();
        let expected: Vec<i64> = rows.iter().map(|r| r.id).filter(|id| seen.insert(*id)).collect();

        let views = fold_rows(rows);

        prop_assert_eq!(views.iter().map(|v| v.id).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn every_row_with_a_product_becomes_one_item(rows in prop::collection::vec(row_strategy(), 0..40)) {
        let with_product = rows.iter().filter(|r| r.product_id.is_some()).count();

        let views = fold_rows(rows.clone());

        prop_assert_eq!(views.iter().map(|v| v.items.len()).sum::<usize>(), with_product);
        for view in &views {
            let expected: Vec<i64> = rows
                .iter()
                .filter(|r| r.id == view.id)
                .filter_map(|r| r.product_id)
                .collect();
            prop_assert_eq!(view.items.iter().map(|i| i.product_id).collect::<Vec<_>>(), expected);
        }
    }
}
