use tombola_core::parameters_json_schema;

#[test]
fn json_schema_requires_dimensions() {
    let schema = parameters_json_schema();
    let json = serde_json::to_value(&schema).expect("serialize generated schema");

    let required: Vec<&str> = json["required"]
        .as_array()
        .expect("required array")
        .iter()
        .filter_map(|value| value.as_str())
        .collect();
    for key in ["R", "T", "m", "n"] {
        assert!(required.contains(&key), "missing required key {key}");
    }

    let properties = json["properties"].as_object().expect("properties");
    assert!(properties.contains_key("unique_scope"));
    assert!(properties.contains_key("swap_iterations"));
    assert!(!required.contains(&"seed"));
}
