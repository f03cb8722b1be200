//! Scan engine (§4.5): streams each region in a filtered set and appends
//! every address whose current window satisfies a predicate into the
//! match store.

use crate::error::Result;
use crate::predicate::ScanPredicate;
use crate::reader::{Provider, ReaderHandle, ReaderPreference, RegionScanner};
use crate::region::FilterView;
use crate::store::{MatchEntry, MatchList};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Aligned,
    Unaligned,
}

/// Knobs a caller can set for a scan pass beyond the predicate itself.
/// Small and explicit, the way `InstallOptions` configures an attach
/// rather than reaching for a builder-pattern crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ScanConfig {
    pub alignment: Alignment,
    pub reader_preference: ReaderPreference,
}

/// Populates `list` with every address in `regions` whose window matches
/// `predicate`. A scan against a new region set appends rather than
/// replaces, so replaying a scan against an overlapping region set is a
/// union.
pub fn scan(
    pid: u32,
    regions: &FilterView<'_>,
    predicate: &ScanPredicate,
    config: ScanConfig,
    list: &mut MatchList,
) -> Result<()> {
    let provider = Provider::select_with_preference(pid, config.reader_preference)?;
    scan_with_handle(provider.handle(), regions, predicate, config.alignment, list)
}

/// Same walk as `scan`, against an already-resolved reader handle. This is
/// the engine's real entry point; `scan` is a thin wrapper that resolves a
/// `pid` to a `Provider` first. Tests drive this directly against a
/// synthetic target.
pub fn scan_with_handle(
    handle: ReaderHandle<'_>,
    regions: &FilterView<'_>,
    predicate: &ScanPredicate,
    alignment: Alignment,
    list: &mut MatchList,
) -> Result<()> {
    let span = tracing::info_span!("scan", regions = regions.len());
    let _enter = span.enter();

    for region in regions.iter() {
        let mut scanner = RegionScanner::new(
            clone_handle(&handle),
            region.start,
            region.end,
            alignment == Alignment::Aligned,
        );

        loop {
            match scanner.next_window() {
                Ok(Some((addr, bytes, n))) => {
                    let value = Value::from_window(&bytes, n);
                    if predicate.eval(&value) {
                        list.push(MatchEntry {
                            address: addr,
                            value,
                            flags: value.flags,
                        });
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(region = region.id, error = %e, "scan aborted reading region");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}

/// `ReaderHandle` holds `&dyn` references, which `Copy`/`Clone` doesn't
/// derive through automatically across the enum; this just re-wraps the
/// same borrow for each region's scanner.
fn clone_handle<'a>(h: &ReaderHandle<'a>) -> ReaderHandle<'a> {
    match h {
        ReaderHandle::Positional(r) => ReaderHandle::Positional(*r),
        ReaderHandle::WordPeek(r) => ReaderHandle::WordPeek(*r),
    }
}
