//! Element body: a tagged, length-prefixed field list.
//!
//! Each field is `[tag u8][len u32 LE][len bytes]`. A zero tag ends the list
//! (it is also what alignment padding decodes as). Unknown tags are skipped so
//! newer writers stay readable.

use crate::AccessType;
use crate::CheckType;
use crate::DataType;
use crate::MetaImage;
use crate::PersistType;
use crate::RawStatValues;
use crate::RecordCategory;
use crate::RecordImage;
use crate::RecordValue;
use crate::Result;
use crate::SourceType;
use crate::StorageError;
use crate::SyncFlags;
use crate::UpdateScope;
use crate::UpdateType;

const TAG_END: u8 = 0;
const TAG_CATEGORY: u8 = 1;
const TAG_DATA_TYPE: u8 = 2;
const TAG_REGISTERED: u8 = 3;
const TAG_SYNC_FLAGS: u8 = 4;
const TAG_VERSION: u8 = 5;
const TAG_NAME: u8 = 6;
const TAG_VALUE: u8 = 7;
const TAG_DEFAULT: u8 = 8;
const TAG_PERSIST: u8 = 9;
const TAG_RAW: u8 = 10;
const TAG_UPDATE_TYPE: u8 = 11;
const TAG_UPDATE_REQUIRED: u8 = 12;
const TAG_CHECK_TYPE: u8 = 13;
const TAG_CHECK_EXPR: u8 = 14;
const TAG_ACCESS: u8 = 15;
const TAG_SOURCE: u8 = 16;
const TAG_RSB_ID: u8 = 17;

const FIELD_HEADER_LEN: usize = 5;
const RAW_LEN: usize = 4 * 8 + 4;

struct FieldWriter {
    out: Vec<u8>,
}

impl FieldWriter {
    fn put(
        &mut self,
        tag: u8,
        bytes: &[u8],
    ) {
        self.out.push(tag);
        self.out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.out.extend_from_slice(bytes);
    }

    fn put_u8(
        &mut self,
        tag: u8,
        v: u8,
    ) {
        self.put(tag, &[v]);
    }
}

fn encode_value(value: &RecordValue) -> Vec<u8> {
    match value {
        RecordValue::Int(v) | RecordValue::Counter(v) => v.to_le_bytes().to_vec(),
        RecordValue::Float(v) => v.to_bits().to_le_bytes().to_vec(),
        RecordValue::String(None) => vec![0],
        RecordValue::String(Some(s)) => {
            let mut out = Vec::with_capacity(1 + s.len());
            out.push(1);
            out.extend_from_slice(s.as_bytes());
            out
        }
    }
}

fn encode_raw(raw: &RawStatValues) -> Vec<u8> {
    let mut out = Vec::with_capacity(RAW_LEN);
    out.extend_from_slice(&raw.sum.to_le_bytes());
    out.extend_from_slice(&raw.count.to_le_bytes());
    out.extend_from_slice(&raw.last_sum.to_le_bytes());
    out.extend_from_slice(&raw.last_count.to_le_bytes());
    out.extend_from_slice(&raw.version.to_le_bytes());
    out
}

/// Serializes one record image into an element body.
pub(crate) fn encode(image: &RecordImage) -> Vec<u8> {
    let mut w = FieldWriter {
        out: Vec::with_capacity(64 + image.name.len()),
    };

    w.put_u8(TAG_CATEGORY, image.category.to_wire());
    w.put_u8(TAG_DATA_TYPE, image.data_type.to_wire());
    w.put_u8(TAG_REGISTERED, image.registered as u8);
    w.put_u8(TAG_SYNC_FLAGS, image.sync_flags.bits());
    w.put(TAG_VERSION, &image.version.to_le_bytes());
    w.put(TAG_NAME, image.name.as_bytes());
    w.put(TAG_VALUE, &encode_value(&image.value));
    w.put(TAG_DEFAULT, &encode_value(&image.default_value));
    if let Some(id) = image.rsb_id {
        w.put(TAG_RSB_ID, &(id as u64).to_le_bytes());
    }

    match &image.meta {
        MetaImage::Stat { persist, raw } => {
            w.put_u8(TAG_PERSIST, persist.to_wire());
            w.put(TAG_RAW, &encode_raw(raw));
        }
        MetaImage::Config {
            update_type,
            update_required,
            check_type,
            check_expr,
            access,
            source,
        } => {
            w.put_u8(TAG_UPDATE_TYPE, update_type.to_wire());
            w.put_u8(TAG_UPDATE_REQUIRED, update_required.bits());
            w.put_u8(TAG_CHECK_TYPE, check_type.to_wire());
            if let Some(expr) = check_expr {
                w.put(TAG_CHECK_EXPR, expr.as_bytes());
            }
            w.put_u8(TAG_ACCESS, access.to_wire());
            w.put_u8(TAG_SOURCE, source.to_wire());
        }
    }

    w.out
}

fn corrupt(msg: impl Into<String>) -> crate::Error {
    StorageError::CorruptEnvelope(msg.into()).into()
}

fn read_u8(
    tag: u8,
    bytes: &[u8],
) -> Result<u8> {
    match bytes {
        [v] => Ok(*v),
        _ => Err(corrupt(format!("field {tag}: expected 1 byte, got {}", bytes.len()))),
    }
}

fn read_array<const N: usize>(
    tag: u8,
    bytes: &[u8],
) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| corrupt(format!("field {tag}: expected {N} bytes, got {}", bytes.len())))
}

fn read_string(
    tag: u8,
    bytes: &[u8],
) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| corrupt(format!("field {tag}: {e}")))
}

fn decode_value(
    tag: u8,
    data_type: DataType,
    bytes: &[u8],
) -> Result<RecordValue> {
    Ok(match data_type {
        DataType::Int => RecordValue::Int(i64::from_le_bytes(read_array(tag, bytes)?)),
        DataType::Counter => RecordValue::Counter(i64::from_le_bytes(read_array(tag, bytes)?)),
        DataType::Float => RecordValue::Float(f64::from_bits(u64::from_le_bytes(read_array(tag, bytes)?))),
        DataType::String => match bytes.split_first() {
            Some((0, _)) => RecordValue::String(None),
            Some((1, s)) => RecordValue::String(Some(read_string(tag, s)?)),
            _ => return Err(corrupt(format!("field {tag}: bad string marker"))),
        },
    })
}

fn decode_raw(bytes: &[u8]) -> Result<RawStatValues> {
    let b: [u8; RAW_LEN] = read_array(TAG_RAW, bytes)?;
    let i64_at = |i: usize| {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[i * 8..i * 8 + 8]);
        i64::from_le_bytes(a)
    };
    let mut v = [0u8; 4];
    v.copy_from_slice(&b[32..36]);
    Ok(RawStatValues {
        sum: i64_at(0),
        count: i64_at(1),
        last_sum: i64_at(2),
        last_count: i64_at(3),
        version: u32::from_le_bytes(v),
    })
}

#[derive(Default)]
struct Fields<'a> {
    category: Option<u8>,
    data_type: Option<u8>,
    registered: Option<u8>,
    sync_flags: Option<u8>,
    version: Option<&'a [u8]>,
    name: Option<&'a [u8]>,
    value: Option<&'a [u8]>,
    default_value: Option<&'a [u8]>,
    rsb_id: Option<&'a [u8]>,
    persist: Option<u8>,
    raw: Option<&'a [u8]>,
    update_type: Option<u8>,
    update_required: Option<u8>,
    check_type: Option<u8>,
    check_expr: Option<&'a [u8]>,
    access: Option<u8>,
    source: Option<u8>,
}

fn split_fields(body: &[u8]) -> Result<Fields<'_>> {
    let mut f = Fields::default();
    let mut pos = 0;

    while pos < body.len() {
        let tag = body[pos];
        if tag == TAG_END {
            break;
        }
        if pos + FIELD_HEADER_LEN > body.len() {
            return Err(corrupt(format!("truncated field header at {pos}")));
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&body[pos + 1..pos + FIELD_HEADER_LEN]);
        let len = u32::from_le_bytes(len) as usize;
        let start = pos + FIELD_HEADER_LEN;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= body.len())
            .ok_or_else(|| corrupt(format!("field {tag} overruns element")))?;
        let bytes = &body[start..end];

        match tag {
            TAG_CATEGORY => f.category = Some(read_u8(tag, bytes)?),
            TAG_DATA_TYPE => f.data_type = Some(read_u8(tag, bytes)?),
            TAG_REGISTERED => f.registered = Some(read_u8(tag, bytes)?),
            TAG_SYNC_FLAGS => f.sync_flags = Some(read_u8(tag, bytes)?),
            TAG_VERSION => f.version = Some(bytes),
            TAG_NAME => f.name = Some(bytes),
            TAG_VALUE => f.value = Some(bytes),
            TAG_DEFAULT => f.default_value = Some(bytes),
            TAG_RSB_ID => f.rsb_id = Some(bytes),
            TAG_PERSIST => f.persist = Some(read_u8(tag, bytes)?),
            TAG_RAW => f.raw = Some(bytes),
            TAG_UPDATE_TYPE => f.update_type = Some(read_u8(tag, bytes)?),
            TAG_UPDATE_REQUIRED => f.update_required = Some(read_u8(tag, bytes)?),
            TAG_CHECK_TYPE => f.check_type = Some(read_u8(tag, bytes)?),
            TAG_CHECK_EXPR => f.check_expr = Some(bytes),
            TAG_ACCESS => f.access = Some(read_u8(tag, bytes)?),
            TAG_SOURCE => f.source = Some(read_u8(tag, bytes)?),
            _ => {}
        }
        pos = end;
    }

    Ok(f)
}

/// Rebuilds an owned record image from an element body.
pub(crate) fn decode(body: &[u8]) -> Result<RecordImage> {
    let f = split_fields(body)?;

    let category = f
        .category
        .and_then(RecordCategory::from_wire)
        .ok_or_else(|| corrupt("missing or unknown category"))?;
    let data_type = f
        .data_type
        .and_then(DataType::from_wire)
        .ok_or_else(|| corrupt("missing or unknown data type"))?;
    let name = read_string(TAG_NAME, f.name.ok_or_else(|| corrupt("missing name"))?)?;
    let value = decode_value(TAG_VALUE, data_type, f.value.ok_or_else(|| corrupt("missing value"))?)?;
    let default_value = match f.default_value {
        Some(bytes) => decode_value(TAG_DEFAULT, data_type, bytes)?,
        None => RecordValue::zero(data_type),
    };
    let version = match f.version {
        Some(bytes) => u32::from_le_bytes(read_array(TAG_VERSION, bytes)?),
        None => 0,
    };
    let rsb_id = match f.rsb_id {
        Some(bytes) => Some(u64::from_le_bytes(read_array(TAG_RSB_ID, bytes)?) as usize),
        None => None,
    };

    let meta = if category.is_stat() {
        MetaImage::Stat {
            persist: match f.persist {
                Some(v) => PersistType::from_wire(v).ok_or_else(|| corrupt("unknown persist type"))?,
                None => PersistType::Persistent,
            },
            raw: match f.raw {
                Some(bytes) => decode_raw(bytes)?,
                None => RawStatValues::default(),
            },
        }
    } else {
        MetaImage::Config {
            update_type: f.update_type.and_then(UpdateType::from_wire).unwrap_or_default(),
            update_required: UpdateScope::from_bits_truncate(f.update_required.unwrap_or(0)),
            check_type: f.check_type.and_then(CheckType::from_wire).unwrap_or_default(),
            check_expr: match f.check_expr {
                Some(bytes) => Some(read_string(TAG_CHECK_EXPR, bytes)?),
                None => None,
            },
            access: f.access.and_then(AccessType::from_wire).unwrap_or_default(),
            source: f.source.and_then(SourceType::from_wire).unwrap_or_default(),
        }
    };

    Ok(RecordImage {
        name,
        category,
        data_type,
        value,
        default_value,
        version,
        registered: f.registered.unwrap_or(0) != 0,
        sync_flags: SyncFlags::from_bits_truncate(f.sync_flags.unwrap_or(0)),
        rsb_id,
        meta,
    })
}
