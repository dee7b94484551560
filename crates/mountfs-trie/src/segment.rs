//! Key segmenters.
//!
//! A segmenter splits a key into ordered segments one step at a time:
//! given the key and a byte offset, it returns the next segment and the
//! offset just past it, or `None` once the key is exhausted. Segments are
//! slices of the key, so segmenting never allocates.

/// Incremental key splitter. See [`path_segmenter`] and [`mount_segmenter`].
pub type Segmenter = fn(&str, usize) -> Option<(&str, usize)>;

/// Splits on `/`, keeping the separator at the front of each segment.
///
/// `"/a/b/c"` yields `"/a"`, `"/b"`, `"/c"`; `"/"` yields `"/"`; a relative
/// key `"a/b"` yields `"a"`, `"/b"`. Repeated and trailing separators
/// produce their own segments, so `"/a/"` and `"/a"` are different keys.
pub fn path_segmenter(key: &str, start: usize) -> Option<(&str, usize)> {
    let rest = key.get(start..).filter(|rest| !rest.is_empty())?;
    let first = rest.chars().next()?.len_utf8();
    let end = rest[first..]
        .find('/')
        .map_or(key.len(), |i| start + first + i);
    Some((&key[start..end], end))
}

/// Segmenter for mount prefixes.
///
/// Like [`path_segmenter`], but runs of separators collapse into one and a
/// trailing separator is ignored, so `"/a//b/"` yields `"/a"`, `"/b"`. A key
/// made only of separators yields the single segment `"/"`, which keeps the
/// root mount in its own node instead of on the trie root.
pub fn mount_segmenter(key: &str, start: usize) -> Option<(&str, usize)> {
    let rest = key.get(start..).filter(|rest| !rest.is_empty())?;
    let body = rest.trim_start_matches('/');
    let skipped = rest.len() - body.len();
    if body.is_empty() {
        return (start == 0).then(|| (&key[..1], key.len()));
    }
    let seg_start = start + skipped.saturating_sub(1);
    let seg_end = body.find('/').map_or(key.len(), |i| start + skipped + i);
    Some((&key[seg_start..seg_end], seg_end))
}

/// Iterator over `(segment, end_offset)` pairs of a key.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    key: &'a str,
    pos: usize,
    segmenter: Segmenter,
}

impl<'a> Segments<'a> {
    pub fn new(key: &'a str, segmenter: Segmenter) -> Self {
        Self {
            key,
            pos: 0,
            segmenter,
        }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (segment, next) = (self.segmenter)(self.key, self.pos)?;
        // A segmenter that fails to advance would loop forever.
        if next <= self.pos {
            self.pos = self.key.len();
            return None;
        }
        self.pos = next;
        Some((segment, next))
    }
}
