//! Offset mapping between an original document and a synthetic source.
//!
//! A mapping is a list of segments, each tying a contiguous original range to a
//! contiguous generated range. Within one direction segments never overlap, except for
//! zero-length anchor segments which only match their exact offset and lose to any
//! ordinary segment. Offsets outside every segment are unmapped and yield `None`.

use std::ops::Range;

/// Operations a feature provider may route through a mapping segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub completion: bool,
    /// Semantic diagnostics reported by the type checker.
    pub diagnostics: bool,
    /// Hover and other semantic queries.
    pub semantic: bool,
    pub rename: bool,
    pub format: bool,
    /// Go-to-definition and references.
    pub navigation: bool,
}

impl Capabilities {
    /// Everything, formatting included.
    pub const fn all() -> Self {
        Self {
            completion: true,
            diagnostics: true,
            semantic: true,
            rename: true,
            format: true,
            navigation: true,
        }
    }

    /// Everything except formatting; used for code that sits inside synthesized context.
    pub const fn unformattable() -> Self {
        Self {
            format: false,
            ..Self::all()
        }
    }

    /// Only diagnostics may land here.
    pub const fn diagnostics_only() -> Self {
        Self {
            completion: false,
            diagnostics: true,
            semantic: false,
            rename: false,
            format: false,
            navigation: false,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Completion => self.completion,
            Capability::Diagnostics => self.diagnostics,
            Capability::Semantic => self.semantic,
            Capability::Rename => self.rename,
            Capability::Format => self.format,
            Capability::Navigation => self.navigation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Completion,
    Diagnostics,
    Semantic,
    Rename,
    Format,
    Navigation,
}

/// One original range tied to one generated range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSegment {
    pub source: Range<usize>,
    pub generated: Range<usize>,
    pub capabilities: Capabilities,
}

impl MappingSegment {
    pub fn new(source: Range<usize>, generated: Range<usize>, capabilities: Capabilities) -> Self {
        Self {
            source,
            generated,
            capabilities,
        }
    }

    /// Equal-length segment starting at the given offsets.
    pub fn with_length(
        source_start: usize,
        generated_start: usize,
        length: usize,
        capabilities: Capabilities,
    ) -> Self {
        Self::new(
            source_start..source_start + length,
            generated_start..generated_start + length,
            capabilities,
        )
    }

    pub fn is_anchor(&self) -> bool {
        self.source.is_empty() && self.generated.is_empty()
    }

    pub fn source_to_generated(&self, offset: usize) -> usize {
        interpolate(offset, &self.source, &self.generated)
    }

    pub fn generated_to_source(&self, offset: usize) -> usize {
        interpolate(offset, &self.generated, &self.source)
    }
}

fn interpolate(offset: usize, from: &Range<usize>, to: &Range<usize>) -> usize {
    let relative = offset.saturating_sub(from.start).min(to.len());
    to.start + relative
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Generated,
}

impl Side {
    fn range(self, segment: &MappingSegment) -> &Range<usize> {
        match self {
            Side::Source => &segment.source,
            Side::Generated => &segment.generated,
        }
    }
}

/// Bidirectional offset mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMapping {
    /// Sorted by source start, anchors first on ties.
    segments: Vec<MappingSegment>,
    /// Indices into `segments`, sorted by generated start, anchors first on ties.
    by_generated: Vec<usize>,
}

impl OffsetMapping {
    pub fn new(mut segments: Vec<MappingSegment>) -> Self {
        segments.sort_by_key(|s| (s.source.start, !s.source.is_empty()));
        let mut by_generated: Vec<usize> = (0..segments.len()).collect();
        by_generated.sort_by_key(|&i| {
            let s = &segments[i];
            (s.generated.start, !s.generated.is_empty())
        });
        Self {
            segments,
            by_generated,
        }
    }

    /// Map `source` (document coordinates) onto `0..source.len()` of a generated file.
    pub fn identity(source: Range<usize>, capabilities: Capabilities) -> Self {
        let length = source.len();
        Self::new(vec![MappingSegment::with_length(
            source.start,
            0,
            length,
            capabilities,
        )])
    }

    pub fn segments(&self) -> &[MappingSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Original offset to generated offset.
    pub fn to_generated(&self, offset: usize) -> Option<usize> {
        self.lookup(Side::Source, offset, |_| true)
            .map(|s| s.source_to_generated(offset))
    }

    /// Generated offset to original offset.
    pub fn to_original(&self, offset: usize) -> Option<usize> {
        self.lookup(Side::Generated, offset, |_| true)
            .map(|s| s.generated_to_source(offset))
    }

    /// Like [`Self::to_generated`], considering only segments that allow `capability`.
    pub fn to_generated_for(&self, offset: usize, capability: Capability) -> Option<usize> {
        self.lookup(Side::Source, offset, |c| c.supports(capability))
            .map(|s| s.source_to_generated(offset))
    }

    /// Like [`Self::to_original`], considering only segments that allow `capability`.
    pub fn to_original_for(&self, offset: usize, capability: Capability) -> Option<usize> {
        self.lookup(Side::Generated, offset, |c| c.supports(capability))
            .map(|s| s.generated_to_source(offset))
    }

    /// Segment containing an original offset.
    pub fn segment_at_source(&self, offset: usize) -> Option<&MappingSegment> {
        self.lookup(Side::Source, offset, |_| true)
    }

    /// Segment containing a generated offset.
    pub fn segment_at_generated(&self, offset: usize) -> Option<&MappingSegment> {
        self.lookup(Side::Generated, offset, |_| true)
    }

    /// Map a generated span back; both ends must map.
    pub fn range_to_original(&self, range: Range<usize>, capability: Capability) -> Option<Range<usize>> {
        let start = self.to_original_for(range.start, capability)?;
        let end = self.to_original_for(range.end, capability)?;
        Some(start..end.max(start))
    }

    /// Map an original span forward; both ends must map.
    pub fn range_to_generated(&self, range: Range<usize>, capability: Capability) -> Option<Range<usize>> {
        let start = self.to_generated_for(range.start, capability)?;
        let end = self.to_generated_for(range.end, capability)?;
        Some(start..end.max(start))
    }

    /// Find the segment holding `offset` on `side`.
    ///
    /// A half-open match wins; a segment whose end equals `offset` is the fallback so
    /// a cursor right after the last mapped character still resolves.
    fn lookup(
        &self,
        side: Side,
        offset: usize,
        allowed: impl Fn(&Capabilities) -> bool,
    ) -> Option<&MappingSegment> {
        let at = move |index: usize| match side {
            Side::Source => &self.segments[index],
            Side::Generated => &self.segments[self.by_generated[index]],
        };
        let upper = match side {
            Side::Source => self.segments.partition_point(|s| s.source.start <= offset),
            Side::Generated => self
                .by_generated
                .partition_point(|&i| self.segments[i].generated.start <= offset),
        };

        let mut fallback: Option<&MappingSegment> = None;
        for segment in (0..upper).rev().map(at) {
            let range = side.range(segment);
            // Anchors can sit inside a real segment; they never end the scan.
            if range.is_empty() {
                if range.start == offset && fallback.is_none() && allowed(&segment.capabilities) {
                    fallback = Some(segment);
                }
                continue;
            }
            if range.end < offset {
                break;
            }
            if !allowed(&segment.capabilities) {
                continue;
            }
            if offset < range.end {
                return Some(segment);
            }
            if fallback.map_or(true, |f| side.range(f).is_empty()) {
                fallback = Some(segment);
            }
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> OffsetMapping {
        OffsetMapping::new(vec![
            MappingSegment::with_length(10, 100, 10, Capabilities::all()),
            MappingSegment::with_length(30, 200, 10, Capabilities::unformattable()),
            MappingSegment::new(0..0, 50..50, Capabilities::diagnostics_only()),
        ])
    }

    #[test]
    fn maps_inside_segments() {
        let map = mapping();
        assert_eq!(map.to_generated(10), Some(100));
        assert_eq!(map.to_generated(15), Some(105));
        assert_eq!(map.to_generated(35), Some(205));
        assert_eq!(map.to_original(109), Some(19));
        assert_eq!(map.to_original(205), Some(35));
    }

    #[test]
    fn gaps_are_unmapped() {
        let map = mapping();
        assert_eq!(map.to_generated(25), None);
        assert_eq!(map.to_original(150), None);
        assert_eq!(map.to_generated(5), None);
    }

    #[test]
    fn end_offset_resolves_as_fallback() {
        let map = mapping();
        assert_eq!(map.to_generated(20), Some(110));
        assert_eq!(map.to_original(210), Some(40));
    }

    #[test]
    fn adjacent_segments_prefer_the_one_starting_there() {
        let map = OffsetMapping::new(vec![
            MappingSegment::with_length(0, 0, 5, Capabilities::all()),
            MappingSegment::with_length(5, 20, 5, Capabilities::all()),
        ]);
        assert_eq!(map.to_generated(5), Some(20));
        assert_eq!(map.to_original(5), Some(5));
    }

    #[test]
    fn anchor_matches_only_its_offset() {
        let map = mapping();
        assert_eq!(map.to_generated(0), Some(50));
        assert_eq!(map.to_original(50), Some(0));
        assert_eq!(map.to_original(51), None);
    }

    #[test]
    fn anchor_loses_to_real_segment() {
        let map = OffsetMapping::new(vec![
            MappingSegment::new(0..0, 7..7, Capabilities::diagnostics_only()),
            MappingSegment::with_length(0, 7, 4, Capabilities::all()),
        ]);
        assert!(!map.segment_at_source(0).unwrap().is_anchor());
        assert!(!map.segment_at_generated(7).unwrap().is_anchor());
    }

    #[test]
    fn anchor_inside_segment_does_not_hide_it() {
        // Frontmatter layout: the body starts with the newline after `---`, so the
        // first statement, where the anchor sits, is inside the segment.
        let map = OffsetMapping::new(vec![
            MappingSegment::with_length(3, 0, 14, Capabilities::unformattable()),
            MappingSegment::new(0..0, 1..1, Capabilities::diagnostics_only()),
        ]);
        assert_eq!(map.to_original(7), Some(10));
        assert_eq!(map.to_original(13), Some(16));
        assert_eq!(map.to_original(14), Some(17));
        assert_eq!(map.to_original(1), Some(4));
        assert_eq!(map.to_original_for(1, Capability::Diagnostics), Some(4));
        assert_eq!(
            map.range_to_original(5..9, Capability::Semantic),
            Some(8..12)
        );
        for generated in 0..14 {
            let original = map.to_original(generated).unwrap();
            assert_eq!(map.to_generated(original), Some(generated));
        }
    }

    #[test]
    fn anchor_alone_still_maps_its_offset() {
        let map = OffsetMapping::new(vec![
            MappingSegment::with_length(3, 0, 14, Capabilities::unformattable()),
            MappingSegment::new(0..0, 1..1, Capabilities::diagnostics_only()),
        ]);
        assert_eq!(map.to_generated(0), Some(1));
        assert_eq!(map.to_generated_for(0, Capability::Semantic), None);
    }

    #[test]
    fn capability_filtering() {
        let map = mapping();
        assert_eq!(map.to_generated_for(15, Capability::Format), Some(105));
        assert_eq!(map.to_generated_for(35, Capability::Format), None);
        assert_eq!(map.to_original_for(50, Capability::Completion), None);
        assert_eq!(map.to_original_for(50, Capability::Diagnostics), Some(0));
    }

    #[test]
    fn round_trip_within_segment() {
        let map = mapping();
        for offset in (10..20).chain(30..40) {
            let generated = map.to_generated(offset).unwrap();
            let original = map.to_original(generated).unwrap();
            assert_eq!(original, offset);
            assert_eq!(map.to_generated(original), Some(generated));
        }
    }

    #[test]
    fn range_mapping_needs_both_ends() {
        let map = mapping();
        assert_eq!(
            map.range_to_original(102..108, Capability::Diagnostics),
            Some(12..18)
        );
        assert_eq!(map.range_to_original(105..205, Capability::Diagnostics), Some(15..35));
        assert_eq!(map.range_to_original(105..150, Capability::Diagnostics), None);
    }

    #[test]
    fn identity_mapping() {
        let map = OffsetMapping::identity(40..60, Capabilities::all());
        assert_eq!(map.to_original(0), Some(40));
        assert_eq!(map.to_generated(59), Some(19));
        assert_eq!(map.to_original(20), Some(60));
        assert_eq!(map.to_original(21), None);
    }
}
