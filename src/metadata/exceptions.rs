//! Exception handling regions of a method body.
//!
//! Region boundaries are [`InstrId`]s into the owning [`crate::metadata::body::MethodBody`]. The
//! `try_end` and `handler_end` markers are exclusive: they name the first instruction after the
//! protected block or handler. A `handler_end` of `None` means the handler runs to the end of
//! the body.

use bitflags::bitflags;

use crate::{assembly::instruction::InstrId, metadata::signatures::TypeSig};

bitflags! {
    /// Kind of an exception handler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// Typed catch clause
        const EXCEPTION = 0x0000;
        /// Filter clause
        const FILTER = 0x0001;
        /// Finally clause
        const FINALLY = 0x0002;
        /// Fault clause
        const FAULT = 0x0004;
    }
}

/// A try region and its handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Handler kind
    pub flags: ExceptionHandlerFlags,
    /// Caught exception type for typed catch clauses
    pub catch_type: Option<TypeSig>,
    /// First protected instruction
    pub try_start: InstrId,
    /// First instruction after the protected block
    pub try_end: InstrId,
    /// First handler instruction
    pub handler_start: InstrId,
    /// First instruction after the handler, `None` for end of body
    pub handler_end: Option<InstrId>,
    /// First filter instruction for filter clauses
    pub filter_start: Option<InstrId>,
}

impl ExceptionHandler {
    /// Short kind name as used by disassemblers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            "filter"
        } else if self.flags.contains(ExceptionHandlerFlags::FINALLY) {
            "finally"
        } else if self.flags.contains(ExceptionHandlerFlags::FAULT) {
            "fault"
        } else {
            "catch"
        }
    }

    /// Every instruction marker of this region.
    #[must_use]
    pub fn markers(&self) -> Vec<InstrId> {
        let mut markers = vec![self.try_start, self.try_end, self.handler_start];
        markers.extend(self.handler_end);
        markers.extend(self.filter_start);
        markers
    }

    /// Whether the markers are ordered try-start < try-end <= handler-start < handler-end.
    ///
    /// `body_len` stands in for a missing `handler_end`.
    #[must_use]
    pub fn is_ordered(&self, body_len: usize) -> bool {
        let handler_end = self.handler_end.map_or(body_len, InstrId::index);
        let filter_ok = self
            .filter_start
            .map_or(true, |filter| filter.index() < self.handler_start.index());
        self.try_start.index() < self.try_end.index()
            && self.try_end.index() <= self.handler_start.index()
            && self.handler_start.index() < handler_end
            && filter_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catch_region() -> ExceptionHandler {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            catch_type: None,
            try_start: InstrId(0),
            try_end: InstrId(3),
            handler_start: InstrId(3),
            handler_end: Some(InstrId(5)),
            filter_start: None,
        }
    }

    #[test]
    fn kinds() {
        let mut region = catch_region();
        assert_eq!(region.kind(), "catch");
        region.flags = ExceptionHandlerFlags::FINALLY;
        assert_eq!(region.kind(), "finally");
        region.flags = ExceptionHandlerFlags::FILTER;
        assert_eq!(region.kind(), "filter");
    }

    #[test]
    fn ordering() {
        let mut region = catch_region();
        assert!(region.is_ordered(6));

        region.handler_end = None;
        assert!(region.is_ordered(6));
        assert!(!region.is_ordered(3));

        let mut inverted = catch_region();
        inverted.try_end = InstrId(4);
        assert!(!inverted.is_ordered(6));
    }

    #[test]
    fn filter_precedes_handler() {
        let mut region = catch_region();
        region.flags = ExceptionHandlerFlags::FILTER;
        region.handler_start = InstrId(4);
        region.filter_start = Some(InstrId(3));
        assert!(region.is_ordered(6));
        assert_eq!(region.markers().len(), 5);

        region.filter_start = Some(InstrId(4));
        assert!(!region.is_ordered(6));
    }
}
