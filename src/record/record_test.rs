use super::*;

#[test]
fn parse_integer_accepts_binary_suffixes() {
    assert_eq!(RecordValue::parse(DataType::Int, "42"), Some(RecordValue::Int(42)));
    assert_eq!(RecordValue::parse(DataType::Int, " 4K "), Some(RecordValue::Int(4096)));
    assert_eq!(RecordValue::parse(DataType::Counter, "2M"), Some(RecordValue::Counter(2 << 20)));
    assert_eq!(RecordValue::parse(DataType::Int, "-3"), Some(RecordValue::Int(-3)));
    assert_eq!(RecordValue::parse(DataType::Int, "abc"), None);
    assert_eq!(RecordValue::parse(DataType::Int, ""), None);
}

#[test]
fn parse_string_treats_literal_null_as_null() {
    assert_eq!(RecordValue::parse(DataType::String, "NULL"), Some(RecordValue::String(None)));
    assert_eq!(RecordValue::parse(DataType::String, ""), Some(RecordValue::string("")));
    assert_eq!(RecordValue::parse(DataType::String, "text"), Some(RecordValue::string("text")));
}

#[test]
fn display_renders_config_text_form() {
    assert_eq!(RecordValue::Int(7).to_string(), "7");
    assert_eq!(RecordValue::Float(1.5).to_string(), "1.500000");
    assert_eq!(RecordValue::String(None).to_string(), "NULL");
    assert_eq!(RecordValue::string("a b").to_string(), "a b");
}

#[test]
fn numeric_readings_convert_into_target_type() {
    assert_eq!(RecordValue::from_i64(DataType::Float, 3), RecordValue::Float(3.0));
    assert_eq!(RecordValue::from_f64(DataType::Counter, 2.9), RecordValue::Counter(2));
    assert_eq!(RecordValue::from_i64(DataType::Int, -1), RecordValue::Int(-1));
}

#[test]
fn category_super_classes() {
    assert!(RecordCategory::Config.is_config());
    assert!(RecordCategory::LocalConfig.is_config());
    assert!(RecordCategory::ProcessStat.is_stat());
    assert!(RecordCategory::NodeStat.is_stat());
    assert!(RecordCategory::PluginStat.is_stat());

    assert!(CategoryMask::STATS.matches(RecordCategory::PluginStat));
    assert!(!CategoryMask::STATS.matches(RecordCategory::Config));
    assert!(CategoryMask::CONFIGS.matches(RecordCategory::LocalConfig));
}

#[test]
fn category_wire_roundtrip_rejects_unknown() {
    for c in [
        RecordCategory::Config,
        RecordCategory::ProcessStat,
        RecordCategory::NodeStat,
        RecordCategory::LocalConfig,
        RecordCategory::PluginStat,
    ] {
        assert_eq!(RecordCategory::from_wire(c.to_wire()), Some(c));
    }
    assert_eq!(RecordCategory::from_wire(0x08), None);
    assert_eq!(RecordCategory::from_wire(0x03), None);
}

#[test]
fn update_type_orders_by_severity() {
    assert!(UpdateType::None < UpdateType::Dynamic);
    assert!(UpdateType::Dynamic < UpdateType::RestartComponent);
    assert!(UpdateType::RestartComponent < UpdateType::RestartAll);
}

#[test]
fn validity_check_by_kind() {
    assert!(validity_check(CheckType::None, None, "anything"));

    assert!(validity_check(CheckType::Str, Some("^[a-z]+$"), "abc"));
    assert!(!validity_check(CheckType::Str, Some("^[a-z]+$"), "ab1"));

    assert!(validity_check(CheckType::Int, Some("[0-10]"), "10"));
    assert!(!validity_check(CheckType::Int, Some("[0-10]"), "11"));
    assert!(validity_check(CheckType::Int, Some("[-5-5]"), "-5"));
    assert!(!validity_check(CheckType::Int, Some("bogus"), "1"));

    assert!(validity_check(CheckType::Ip, None, "10.0.0.1"));
    assert!(validity_check(CheckType::Ip, None, "::1"));
    assert!(!validity_check(CheckType::Ip, None, "10.0.0"));
}

#[test]
fn retype_zeroes_old_storage() {
    let mut state = RecordState {
        category: RecordCategory::ProcessStat,
        data_type: DataType::String,
        value: RecordValue::string("old"),
        default_value: RecordValue::string("old"),
        version: 0,
        registered: true,
        sync_flags: SyncFlags::empty(),
        rsb_id: None,
        meta: RecordMeta::for_category(RecordCategory::ProcessStat, SourceType::Default),
    };

    state.retype(DataType::Int);

    assert_eq!(state.data_type, DataType::Int);
    assert_eq!(state.value, RecordValue::Int(0));
    assert_eq!(state.default_value, RecordValue::Int(0));
}

#[test]
fn image_captures_metadata_variant() {
    let state = RecordState {
        category: RecordCategory::Config,
        data_type: DataType::Int,
        value: RecordValue::Int(5),
        default_value: RecordValue::Int(1),
        version: 3,
        registered: true,
        sync_flags: SyncFlags::DISK,
        rsb_id: None,
        meta: RecordMeta::for_category(RecordCategory::Config, SourceType::File),
    };
    let record = Record::new(0, "proxy.config.x", state);

    let image = record.image();
    assert_eq!(image.name, "proxy.config.x");
    assert_eq!(image.value, RecordValue::Int(5));
    assert_eq!(image.version, 3);
    assert_eq!(image.source(), SourceType::File);
    assert!(image.persist().is_none());
}
