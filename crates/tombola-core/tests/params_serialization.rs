use tombola_core::{Parameters, SetScope, Uniformity, params_hash};

#[test]
fn serializes_parameters_with_config_keys() {
    let mut params = Parameters::new(3, 1, 1, 3);
    params.unique_scope.insert(SetScope::ColSets);
    params.uniformity = Uniformity::Near;

    let value = serde_json::to_value(&params).expect("serialize params");
    assert_eq!(value["R"], 3);
    assert_eq!(value["T"], 1);
    assert_eq!(value["m"], 1);
    assert_eq!(value["n"], 3);
    assert_eq!(value["uniformity"], "near");
    assert_eq!(
        value["unique_scope"],
        serde_json::json!(["row_sets", "col_sets"])
    );
    assert_eq!(value["seed"]["engine"], "chacha20");
    assert_eq!(value["seed"]["mode"], "direct");
}

#[test]
fn round_trip_keeps_hash() {
    let mut params = Parameters::new(75, 150, 3, 4);
    params.seed.value = 42;
    params.position_balance = true;

    let json = serde_json::to_string_pretty(&params).expect("serialize params");
    let back: Parameters = serde_json::from_str(&json).expect("deserialize params");

    assert_eq!(back, params);
    assert_eq!(
        params_hash(&back).expect("hash"),
        params_hash(&params).expect("hash")
    );
}
