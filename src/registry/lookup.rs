use regex::Regex;
use regex::RegexBuilder;

use super::Registry;
use crate::CategoryMask;
use crate::DataType;
use crate::RecordCategory;
use crate::RecordImage;
use crate::RecordValue;
use crate::Result;

/// View of one record handed to an [`Registry::enumerate`] callback while
/// the record's lock is held.
#[derive(Debug)]
pub struct EnumeratedRecord<'a> {
    pub name: &'a str,
    pub category: RecordCategory,
    pub data_type: DataType,
    pub registered: bool,
    pub value: &'a RecordValue,
}

/// Lazy scan over records whose name matches a pattern.
///
/// Each step locks only the record being reported. Records appended after
/// the scan started are picked up if the cursor has not yet passed them.
pub struct PatternMatches<'a> {
    registry: &'a Registry,
    regex: Regex,
    mask: CategoryMask,
    cursor: usize,
}

impl PatternMatches<'_> {
    /// Starts the scan over from the first record.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for PatternMatches<'_> {
    type Item = RecordImage;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(record) = self.registry.record_at(self.cursor) {
            self.cursor += 1;
            if !self.regex.is_match(record.name()) {
                continue;
            }
            let state = record.lock();
            if self.mask.matches(state.category) {
                return Some(RecordImage::capture(record.name(), &state));
            }
        }
        None
    }
}

impl Registry {
    /// Case-insensitive regex scan of record names, filtered by category.
    pub fn lookup_by_pattern(
        &self,
        pattern: &str,
        mask: CategoryMask,
    ) -> Result<PatternMatches<'_>> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(PatternMatches {
            registry: self,
            regex,
            mask,
            cursor: 0,
        })
    }

    /// Calls `f` for every record in `mask`, one record lock at a time.
    pub fn enumerate(
        &self,
        mask: CategoryMask,
        mut f: impl FnMut(EnumeratedRecord<'_>),
    ) {
        for record in self.records() {
            let state = record.lock();
            if !mask.matches(state.category) {
                continue;
            }
            f(EnumeratedRecord {
                name: record.name(),
                category: state.category,
                data_type: state.data_type,
                registered: state.registered,
                value: &state.value,
            });
        }
    }
}
