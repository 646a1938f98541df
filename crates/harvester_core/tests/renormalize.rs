//! Rows rendered back to raw JSON must normalize to themselves, whatever the
//! shape of the source record.
use harvester_core::{ChildPolicyConfig, FieldConfig, FieldKind, Normalizer};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        (-1.0e6f64..1.0e6).prop_map(|x| json!(x)),
        "[ a-zа-я0-9,.-]{0,8}".prop_map(Value::String),
    ]
}

fn record() -> impl Strategy<Value = Value> {
    let keys = prop::sample::select(vec!["a", "b", "flag", "items", "rooms"]);
    leaf().prop_recursive(3, 32, 4, move |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(keys.clone().prop_map(str::to_string), inner, 0..5)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::text("a", "a").with_fallback("$.b"),
        FieldConfig::number("b", "b"),
        FieldConfig::new("flag", FieldKind::Bool, "flag"),
        FieldConfig::new("rooms", FieldKind::Json, "$.rooms"),
        FieldConfig::text("first_item", "$.items[*].a"),
    ]
}

fn assert_stable(normalizer: &Normalizer, record: &Value) -> Result<(), TestCaseError> {
    let identity = Normalizer::identity(normalizer.schema());
    for row in normalizer.normalize(record) {
        prop_assert_eq!(identity.normalize(&row.to_raw()), vec![row.clone()]);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn plain_rows_renormalize_unchanged(raw in record()) {
        let normalizer = Normalizer::new(&fields(), &ChildPolicyConfig::None)
            .expect("valid normalizer");
        assert_stable(&normalizer, &raw)?;
    }

    #[test]
    fn exploded_rows_renormalize_unchanged(raw in record()) {
        let normalizer = Normalizer::new(
            &fields(),
            &ChildPolicyConfig::Explode("items[*].rooms[*]".to_string()),
        )
        .expect("valid normalizer");
        assert_stable(&normalizer, &raw)?;
    }

    #[test]
    fn flattened_rows_renormalize_unchanged(raw in record()) {
        let normalizer = Normalizer::new(
            &fields(),
            &ChildPolicyConfig::Flatten {
                path: "items[*]".to_string(),
                into: "items_json".to_string(),
            },
        )
        .expect("valid normalizer");
        assert_stable(&normalizer, &raw)?;
    }

    #[test]
    fn every_row_carries_the_declared_columns(raw in record()) {
        let normalizer = Normalizer::new(
            &fields(),
            &ChildPolicyConfig::Explode("items[*]".to_string()),
        )
        .expect("valid normalizer");
        let expected: Vec<&str> = normalizer.schema().names().collect();
        let rows = normalizer.normalize(&raw);
        prop_assert!(!rows.is_empty());
        for row in &rows {
            prop_assert_eq!(row.names().collect::<Vec<_>>(), expected.clone());
        }
    }
}
