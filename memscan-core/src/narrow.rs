//! Narrow engine (§4.6): re-reads every candidate in a match store and
//! drops those that no longer satisfy a predicate.

use crate::error::Result;
use crate::predicate::NarrowPredicate;
use crate::reader::{read_window_at, Provider, ReaderHandle, ReaderPreference};
use crate::store::{Keep, MatchList};
use crate::value::Value;

/// Knobs a caller can set for a narrow pass; currently just the reader
/// provider preference (§4.3's selection policy is the default).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NarrowConfig {
    pub reader_preference: ReaderPreference,
}

/// Re-reads every candidate in `list` against `predicate` and drops those
/// that fail, then compacts the store. `region_end_for` tells the engine
/// how far past a candidate's address it is still allowed to read (the
/// end of whatever region the address falls in); candidates whose region
/// can no longer be determined are dropped rather than mis-read.
pub fn narrow(
    pid: u32,
    predicate: &NarrowPredicate,
    config: NarrowConfig,
    region_end_for: impl Fn(u64) -> Option<u64>,
    list: &mut MatchList,
) -> Result<()> {
    let provider = Provider::select_with_preference(pid, config.reader_preference)?;
    narrow_with_handle(provider.handle(), predicate, region_end_for, list)
}

/// Same walk as `narrow`, against an already-resolved reader handle.
pub fn narrow_with_handle(
    handle: ReaderHandle<'_>,
    predicate: &NarrowPredicate,
    region_end_for: impl Fn(u64) -> Option<u64>,
    list: &mut MatchList,
) -> Result<()> {
    let span = tracing::info_span!("narrow");
    let _enter = span.enter();

    let mut read_err = None;

    list.iterate_mut(|entry| {
        // Once a read has failed we stop touching further entries —
        // the store is not rolled back, the pass just aborts early.
        if read_err.is_some() {
            return Keep::Keep;
        }

        let end = match region_end_for(entry.address) {
            Some(e) => e,
            None => return Keep::Drop,
        };

        match read_window_at(&handle, entry.address, end) {
            Ok((bytes, n)) if n > 0 => {
                let fresh = Value::from_window(&bytes, n);
                if predicate.eval(&entry.value, &fresh) {
                    entry.value = fresh;
                    entry.flags = fresh.flags;
                    Keep::Keep
                } else {
                    Keep::Drop
                }
            }
            Ok(_) => Keep::Drop,
            Err(e) => {
                tracing::warn!(address = entry.address, error = %e, "narrow read failed");
                read_err = Some(e);
                Keep::Drop
            }
        }
    });

    list.compact();

    match read_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::ScanPredicate;
    use crate::region::FilterKind;
    use crate::scan::{scan_with_handle, Alignment};
    use crate::value::parse_needle;
    use crate::testutil::SyntheticTarget;

    fn scanned_store(target: &SyntheticTarget, needle: &str) -> MatchList {
        let region_set = target.region_set();
        let view = region_set.filter(FilterKind::PathnameEqual, "").unwrap();
        let mut list = MatchList::new();
        scan_with_handle(
            target.handle(),
            &view,
            &ScanPredicate::Eq(parse_needle(needle).unwrap()),
            Alignment::Aligned,
            &mut list,
        )
        .unwrap();
        list
    }

    #[test]
    fn e2_narrow_decreased() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&41u64.to_le_bytes());
        bytes.extend_from_slice(&42u64.to_le_bytes());
        bytes.extend_from_slice(&43u64.to_le_bytes());
        let target = SyntheticTarget::new(0x1000, bytes);

        let mut list = scanned_store(&target, "42");
        assert_eq!(list.len(), 1);

        target.poke(0x1008, &40u64.to_le_bytes());

        let end = target.end();
        narrow_with_handle(
            target.handle(),
            &NarrowPredicate::Decreased,
            |_addr| Some(end),
            &mut list,
        )
        .unwrap();

        assert_eq!(list.len(), 1);
        let entry = list.iter().next().unwrap();
        assert_eq!(entry.address, 0x1008);
        assert_eq!(entry.value.u64(), 40);
    }

    #[test]
    fn scan_eq_then_narrow_ne_yields_empty_store() {
        let target = SyntheticTarget::new(0x4000, 99u64.to_le_bytes().to_vec());
        let mut list = scanned_store(&target, "99");
        assert_eq!(list.len(), 1);

        let end = target.end();
        narrow_with_handle(
            target.handle(),
            &NarrowPredicate::Scan(ScanPredicate::Ne(parse_needle("99").unwrap())),
            |_| Some(end),
            &mut list,
        )
        .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn narrow_unchanged_on_static_target_is_noop() {
        let target = SyntheticTarget::new(0x5000, 7u64.to_le_bytes().to_vec());
        let mut list = scanned_store(&target, "7");
        let before = list.len();

        let end = target.end();
        narrow_with_handle(target.handle(), &NarrowPredicate::Unchanged, |_| Some(end), &mut list)
            .unwrap();
        assert_eq!(list.len(), before);

        narrow_with_handle(target.handle(), &NarrowPredicate::Unchanged, |_| Some(end), &mut list)
            .unwrap();
        assert_eq!(list.len(), before);
    }

    #[test]
    fn narrow_changed_then_unchanged_empties_static_target() {
        let target = SyntheticTarget::new(0x6000, 11u64.to_le_bytes().to_vec());
        let mut list = scanned_store(&target, "11");
        let end = target.end();

        narrow_with_handle(target.handle(), &NarrowPredicate::Changed, |_| Some(end), &mut list)
            .unwrap();
        assert!(list.is_empty());

        narrow_with_handle(target.handle(), &NarrowPredicate::Unchanged, |_| Some(end), &mut list)
            .unwrap();
        assert!(list.is_empty());
    }
}
