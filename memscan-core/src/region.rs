//! Region enumeration: parsing `/proc/<pid>/maps` into an ordered, filterable
//! set of mapped ranges.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::str::FromStr;

bitflags::bitflags! {
    /// Permission bits parsed from the four-byte `perms` field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Perms: u8 {
        const READ  = 0b0001;
        const WRITE = 0b0010;
        const EXEC  = 0b0100;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CowKind {
    Private,
    Shared,
    Unknown,
}

impl CowKind {
    fn from_byte(b: u8) -> Self {
        match b {
            b'p' => Self::Private,
            b's' => Self::Shared,
            _ => Self::Unknown,
        }
    }
}

/// One line of `/proc/<pid>/maps`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// 1-based, monotonic within a `RegionSet`.
    pub id: u64,
    pub start: u64,
    pub end: u64,
    pub perms: Perms,
    pub cow: CowKind,
    pub offset: u64,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub inode: u64,
    pub pathname: String,
}

impl Region {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    fn basename(&self) -> &str {
        self.pathname
            .rsplit('/')
            .next()
            .unwrap_or(self.pathname.as_str())
    }
}

/// `start-end perms offset major:minor inode [pathname]`
struct ParsedLine {
    start: u64,
    end: u64,
    perms: Perms,
    cow: CowKind,
    offset: u64,
    dev_major: u32,
    dev_minor: u32,
    inode: u64,
    pathname: String,
}

/// Splits off `n` whitespace-delimited fields, then returns the remainder
/// with only its leading whitespace trimmed off — the pathname field may
/// itself contain spaces, so it cannot be tokenized like the rest.
fn split_fields(line: &str, n: usize) -> (Vec<&str>, &str) {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        match rest.find(char::is_whitespace) {
            Some(idx) => {
                fields.push(&rest[..idx]);
                rest = &rest[idx..];
            }
            None => {
                fields.push(rest);
                rest = "";
            }
        }
    }
    (fields, rest.trim_start())
}

impl FromStr for ParsedLine {
    type Err = ();

    fn from_str(line: &str) -> std::result::Result<Self, ()> {
        let (fields, pathname) = split_fields(line, 5);
        if fields.iter().any(|f| f.is_empty()) {
            return Err(());
        }
        let range = fields[0];
        let perms_field = fields[1];
        let offset_field = fields[2];
        let dev_field = fields[3];
        let inode_field = fields[4];
        let pathname = pathname.to_string();

        let dash = range.find('-').ok_or(())?;
        let start = u64::from_str_radix(&range[..dash], 16).map_err(|_| ())?;
        let end = u64::from_str_radix(&range[dash + 1..], 16).map_err(|_| ())?;

        let pbytes = perms_field.as_bytes();
        if pbytes.len() != 4 {
            return Err(());
        }
        let mut perms = Perms::empty();
        if pbytes[0] == b'r' {
            perms |= Perms::READ;
        }
        if pbytes[1] == b'w' {
            perms |= Perms::WRITE;
        }
        if pbytes[2] == b'x' {
            perms |= Perms::EXEC;
        }
        let cow = CowKind::from_byte(pbytes[3]);

        let offset = u64::from_str_radix(offset_field, 16).map_err(|_| ())?;

        let colon = dev_field.find(':').ok_or(())?;
        let dev_major = u32::from_str_radix(&dev_field[..colon], 16).map_err(|_| ())?;
        let dev_minor = u32::from_str_radix(&dev_field[colon + 1..], 16).map_err(|_| ())?;

        let inode = inode_field.parse::<u64>().map_err(|_| ())?;

        Ok(ParsedLine {
            start,
            end,
            perms,
            cow,
            offset,
            dev_major,
            dev_minor,
            inode,
            pathname,
        })
    }
}

/// An append-only, parse-order collection of regions for one target at one
/// point in time. Replaced wholesale by the next parse.
#[derive(Debug)]
pub struct RegionSet {
    regions: Vec<Region>,
    page_size: u64,
}

impl RegionSet {
    /// Reads and parses `/proc/<pid>/maps`, keeping only regions that are
    /// both readable and writable.
    pub fn parse(pid: u32) -> Result<Self> {
        let path = format!("/proc/{}/maps", pid);
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                Error::PermissionDenied { pid }
            } else {
                Error::Io(e)
            }
        })?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
        Self::parse_text(&text, page_size)
    }

    /// The text-parsing core of `parse`, split out so tests can exercise it
    /// against arbitrary map text without a real `/proc/<pid>/maps`.
    fn parse_text(text: &str, page_size: u64) -> Result<Self> {
        let mut regions = Vec::new();
        let mut next_id = 1u64;
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let field_count = line.split_whitespace().count();
            if field_count < 5 {
                return Err(Error::MalformedMapLine(line.to_string()));
            }
            let parsed: ParsedLine = line
                .parse()
                .map_err(|_| Error::MalformedMapLine(line.to_string()))?;

            if !parsed.perms.contains(Perms::READ) || !parsed.perms.contains(Perms::WRITE) {
                continue;
            }

            // Ids are 1-based and contiguous over the *retained* set (§3),
            // so only regions that pass the RW filter consume one.
            let id = next_id;
            next_id += 1;

            regions.push(Region {
                id,
                start: parsed.start,
                end: parsed.end,
                perms: parsed.perms,
                cow: parsed.cow,
                offset: parsed.offset,
                dev_major: parsed.dev_major,
                dev_minor: parsed.dev_minor,
                inode: parsed.inode,
                pathname: parsed.pathname,
            });
        }

        Ok(Self { regions, page_size })
    }

    /// Builds a region set directly from already-parsed regions, for tests
    /// and for callers that source regions from something other than a live
    /// `/proc/<pid>/maps` (see `testutil::SyntheticTarget`).
    pub fn from_regions(regions: Vec<Region>, page_size: u64) -> Self {
        Self { regions, page_size }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn filter(&self, kind: FilterKind, arg: &str) -> Option<FilterView<'_>> {
        self.filter_impl(kind, arg, false)
    }

    pub fn filter_not(&self, kind: FilterKind, arg: &str) -> Option<FilterView<'_>> {
        self.filter_impl(kind, arg, true)
    }

    fn filter_impl(&self, kind: FilterKind, arg: &str, negate: bool) -> Option<FilterView<'_>> {
        let matches = |r: &Region| -> bool {
            match kind {
                FilterKind::PathnameEqual => r.pathname == arg,
                FilterKind::BasenameEqual => r.basename() == arg,
                FilterKind::RegexMatch => Regex::new(arg)
                    .map(|re| re.is_match(&r.pathname))
                    .unwrap_or(false),
            }
        };

        let indices: Vec<usize> = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| matches(r) != negate)
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            None
        } else {
            Some(FilterView {
                set: self,
                indices,
            })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    PathnameEqual,
    BasenameEqual,
    RegexMatch,
}

/// A borrowed sub-selection of a `RegionSet`. Cannot outlive its source.
#[derive(Debug)]
pub struct FilterView<'a> {
    set: &'a RegionSet,
    indices: Vec<usize>,
}

impl<'a> FilterView<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Region> + '_ {
        self.indices.iter().map(move |&i| &self.set.regions()[i])
    }
}

impl fmt::Display for Region {
    /// Round-trips the five fields {start, end, perms, offset, inode} the
    /// way a map-file line presents them.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.perms.contains(Perms::READ) { 'r' } else { '-' };
        let w = if self.perms.contains(Perms::WRITE) { 'w' } else { '-' };
        let x = if self.perms.contains(Perms::EXEC) { 'x' } else { '-' };
        let c = match self.cow {
            CowKind::Private => 'p',
            CowKind::Shared => 's',
            CowKind::Unknown => '-',
        };
        write!(
            f,
            "{:x}-{:x} {}{}{}{} {:08x} {:02x}:{:02x} {}",
            self.start, self.end, r, w, x, c, self.offset, self.dev_major, self.dev_minor, self.inode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_anonymous_mapping() {
        let line = "57942200000-57942300000 rw-p 00000000 00:00 0";
        let parsed: ParsedLine = line.parse().unwrap();
        assert_eq!(parsed.start, 0x57942200000);
        assert_eq!(parsed.end, 0x57942300000);
        assert!(parsed.perms.contains(Perms::READ));
        assert!(parsed.perms.contains(Perms::WRITE));
        assert!(!parsed.perms.contains(Perms::EXEC));
        assert_eq!(parsed.cow, CowKind::Private);
        assert_eq!(parsed.pathname, "");
    }

    #[test]
    fn parses_named_mapping() {
        let line = "7feca169f000-7feca16a0000 rw-p 0001b000 fd:00 1705088                    /usr/lib64/libpthread-2.33.so";
        let parsed: ParsedLine = line.parse().unwrap();
        assert_eq!(parsed.pathname, "/usr/lib64/libpthread-2.33.so");
    }

    #[test]
    fn parses_pseudo_path() {
        let line = "7fff249fc000-7fff249fe000 r-xp 00000000 00:00 0                          [vdso]";
        let parsed: ParsedLine = line.parse().unwrap();
        assert_eq!(parsed.pathname, "[vdso]");
        assert!(parsed.perms.contains(Perms::EXEC));
    }

    #[test]
    fn malformed_line_is_rejected() {
        let short = "not enough fields";
        assert!(short.parse::<ParsedLine>().is_err());
    }

    fn region(id: u64, start: u64, end: u64, pathname: &str) -> Region {
        Region {
            id,
            start,
            end,
            perms: Perms::READ | Perms::WRITE,
            cow: CowKind::Private,
            offset: 0,
            dev_major: 0,
            dev_minor: 0,
            inode: 0,
            pathname: pathname.into(),
        }
    }

    #[test]
    fn filter_by_basename() {
        let regions = vec![
            region(1, 0x1000, 0x2000, "/usr/lib/libc.so.6"),
            region(2, 0x2000, 0x3000, "/usr/local/lib/libfoo.so"),
            region(3, 0x3000, 0x4000, "[heap]"),
        ];
        let set = RegionSet::from_regions(regions, 0x1000);

        let view = set.filter(FilterKind::BasenameEqual, "libc.so.6").unwrap();
        assert_eq!(view.len(), 1);

        let view = set
            .filter_not(FilterKind::BasenameEqual, "libc.so.6")
            .unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn empty_filter_yields_none() {
        let set = RegionSet::from_regions(vec![], 0x1000);
        assert!(set.filter(FilterKind::BasenameEqual, "nope").is_none());
    }

    #[test]
    fn display_round_trips_offset_dev_and_inode() {
        let line = "7feca169f000-7feca16a0000 rw-p 0001b000 fd:01 1705088                    /usr/lib64/libpthread-2.33.so";
        let parsed: ParsedLine = line.parse().unwrap();
        let r = Region {
            id: 1,
            start: parsed.start,
            end: parsed.end,
            perms: parsed.perms,
            cow: parsed.cow,
            offset: parsed.offset,
            dev_major: parsed.dev_major,
            dev_minor: parsed.dev_minor,
            inode: parsed.inode,
            pathname: parsed.pathname.clone(),
        };
        let rendered = format!("{} {}", r, r.pathname);
        let reparsed: ParsedLine = rendered.parse().unwrap();
        assert_eq!(reparsed.start, parsed.start);
        assert_eq!(reparsed.end, parsed.end);
        assert_eq!(reparsed.perms, parsed.perms);
        assert_eq!(reparsed.offset, parsed.offset);
        assert_eq!(reparsed.dev_major, parsed.dev_major);
        assert_eq!(reparsed.dev_minor, parsed.dev_minor);
        assert_eq!(reparsed.inode, parsed.inode);
    }

    #[test]
    fn ids_are_contiguous_over_retained_regions_only() {
        // An r-xp (code) segment sits between two rw-p segments, the
        // ordinary layout of a real `/proc/<pid>/maps`. Only the two rw-p
        // lines survive the filter and they must be numbered 1, 2 — not
        // 2, 4 from counting the discarded r-xp lines too.
        let maps = "\
57942200000-57942300000 r-xp 00000000 00:00 0
57942300000-57942400000 rw-p 00000000 00:00 0
57942400000-57942500000 r-xp 00000000 00:00 0
57942500000-57942600000 rw-p 00000000 00:00 0
";
        let set = RegionSet::parse_text(maps, 0x1000).unwrap();
        let ids: Vec<u64> = set.regions().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(set.regions()[0].start, 0x57942300000);
        assert_eq!(set.regions()[1].start, 0x57942500000);
    }
}
