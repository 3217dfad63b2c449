use super::*;
use crate::AccessType;
use crate::CheckType;
use crate::DataType;
use crate::MetaImage;
use crate::PersistType;
use crate::RawStatValues;
use crate::RecordCategory;
use crate::RecordValue;
use crate::SourceType;
use crate::SyncFlags;
use crate::UpdateScope;
use crate::UpdateType;

fn stat_image(
    name: &str,
    value: i64,
) -> RecordImage {
    RecordImage {
        name: name.to_string(),
        category: RecordCategory::ProcessStat,
        data_type: DataType::Counter,
        value: RecordValue::Counter(value),
        default_value: RecordValue::Counter(0),
        version: 2,
        registered: true,
        sync_flags: SyncFlags::PEER,
        rsb_id: Some(3),
        meta: MetaImage::Stat {
            persist: PersistType::NonPersistent,
            raw: RawStatValues {
                sum: value,
                count: 4,
                last_sum: 1,
                last_count: 2,
                version: 2,
            },
        },
    }
}

fn config_image(
    name: &str,
    value: RecordValue,
) -> RecordImage {
    RecordImage {
        name: name.to_string(),
        category: RecordCategory::Config,
        data_type: value.data_type(),
        default_value: RecordValue::zero(value.data_type()),
        value,
        version: 0,
        registered: true,
        sync_flags: SyncFlags::empty(),
        rsb_id: None,
        meta: MetaImage::Config {
            update_type: UpdateType::RestartComponent,
            update_required: UpdateScope::PROCESS,
            check_type: CheckType::Str,
            check_expr: Some("^.*$".to_string()),
            access: AccessType::ReadOnly,
            source: SourceType::Environment,
        },
    }
}

#[test]
fn fresh_envelope_is_empty() {
    let env = Envelope::new(MessageType::Set);
    assert!(env.is_empty());
    assert_eq!(env.len(), ENVELOPE_HEADER_LEN);
    assert_eq!(env.iter().count(), 0);
}

#[test]
fn marshal_and_iterate_preserves_order_and_fields() {
    let images = vec![
        stat_image("proxy.process.a", 10),
        config_image("proxy.config.b", RecordValue::string("hello")),
        config_image("proxy.config.c", RecordValue::Float(0.25)),
    ];

    let mut env = Envelope::new(MessageType::Push);
    for image in &images {
        env.marshal(image);
    }

    assert_eq!(env.entries(), 3);
    let decoded: Vec<_> = env.iter().collect();
    assert_eq!(decoded, images);
}

#[test]
fn elements_are_aligned() {
    let mut env = Envelope::new(MessageType::Set);
    env.marshal(&config_image("x", RecordValue::string("odd")));
    assert_eq!(env.len() % ELEMENT_ALIGN, 0);
}

#[test]
fn null_and_empty_strings_stay_distinct() {
    let mut env = Envelope::new(MessageType::Set);
    env.marshal(&config_image("proxy.config.null", RecordValue::String(None)));
    env.marshal(&config_image("proxy.config.empty", RecordValue::string("")));

    let bytes = env.to_bytes();
    let decoded: Vec<_> = Envelope::from_bytes(&bytes).unwrap().iter().collect();
    assert_eq!(decoded[0].value, RecordValue::String(None));
    assert_eq!(decoded[1].value, RecordValue::string(""));
}

#[test]
fn buffer_grows_by_doubling() {
    let mut env = Envelope::new(MessageType::Push);
    let initial = env.capacity();
    let long = "v".repeat(3 * initial);
    env.marshal(&config_image("proxy.config.long", RecordValue::string(long.clone())));

    assert!(env.capacity() >= env.len());
    assert_eq!(env.capacity() % initial, 0);
    assert!((env.capacity() / initial).is_power_of_two());
    let decoded = env.iter().next().unwrap();
    assert_eq!(decoded.value.as_str(), Some(long.as_str()));
}

#[test]
fn wire_roundtrip_keeps_type_and_entries() {
    let mut env = Envelope::new(MessageType::PullAck);
    for i in 0..50 {
        env.marshal(&stat_image(&format!("proxy.process.s{i}"), i));
    }

    let bytes = env.to_bytes();
    assert_eq!(bytes.len(), env.len());

    let back = Envelope::from_bytes(&bytes).unwrap();
    assert_eq!(back.msg_type(), MessageType::PullAck);
    assert_eq!(back.entries(), 50);
    assert_eq!(back.iter().count(), 50);
}

#[test]
fn iteration_restarts_from_first_element() {
    let mut env = Envelope::new(MessageType::Set);
    env.marshal(&stat_image("a", 1));
    env.marshal(&stat_image("b", 2));

    let mut it = env.iter();
    assert_eq!(it.next().unwrap().name, "a");

    let names: Vec<_> = env.iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn corrupt_magic_truncates_iteration() {
    let mut env = Envelope::new(MessageType::Push);
    env.marshal(&stat_image("first", 1));
    let second_at = env.o_write;
    env.marshal(&stat_image("second", 2));
    env.marshal(&stat_image("third", 3));

    env.buf[second_at] ^= 0xFF;

    let mut it = env.iter();
    assert_eq!(it.next().unwrap().name, "first");
    assert!(it.next().is_none());
    assert!(it.next().is_none());
}

#[test]
fn bad_next_offset_truncates_iteration() {
    let mut env = Envelope::new(MessageType::Push);
    env.marshal(&stat_image("first", 1));
    let at = ENVELOPE_HEADER_LEN;
    write_u32(&mut env.buf, at + 4, 1_000_000);

    assert_eq!(env.iter().count(), 0);
}

#[test]
fn truncated_wire_bytes_yield_prefix() {
    let mut env = Envelope::new(MessageType::Push);
    env.marshal(&stat_image("first", 1));
    let cut = env.len();
    env.marshal(&stat_image("second", 2));

    let bytes = env.to_bytes();
    let back = Envelope::from_bytes(&bytes[..cut + 4]).unwrap();
    let names: Vec<_> = back.iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["first"]);
}

#[test]
fn from_bytes_rejects_bad_header() {
    assert!(Envelope::from_bytes(&[0u8; 8]).is_err());

    let mut bytes = Envelope::new(MessageType::Set).to_bytes();
    bytes[0] = 0x7F;
    assert!(Envelope::from_bytes(&bytes).is_err());
}

#[test]
fn unknown_fields_are_skipped() {
    let image = config_image("proxy.config.k", RecordValue::Int(9));
    let mut body = element::encode(&image);
    body.push(0x63);
    body.extend_from_slice(&3u32.to_le_bytes());
    body.extend_from_slice(b"abc");

    let decoded = element::decode(&body).unwrap();
    assert_eq!(decoded, image);
}

#[test]
fn value_of_wrong_width_is_corrupt() {
    let image = config_image("proxy.config.k", RecordValue::string("abc"));
    let mut body = element::encode(&image);
    // Second field is the data type: tag(1) len(4) value(1) at offset 6
    assert_eq!(body[6], 2);
    body[11] = DataType::Int.to_wire();

    assert!(element::decode(&body).is_err());
}
