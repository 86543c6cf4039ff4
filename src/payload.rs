//! The frame that travels the layer stack.
//!
//! The original links together one heap record per layer (radio payload wraps
//! a MAC payload wraps an LLC payload wraps a link payload wraps the net
//! payload's bytes). Per the stacking invariant in the data model, this crate
//! instead uses one struct carrying every layer's header fields plus the
//! owned byte payload, populated top-down as a frame descends the stack and
//! read bottom-up as it ascends. Fields not yet meaningful at a given layer
//! are left at their default.

/// A frame as it exists somewhere in the layer stack.
///
/// Not every field is meaningful at every layer: `seq`/`ack` are LLC-owned,
/// `received_power` is filled in by the radio on delivery, `tainted` is
/// radio-owned. Net and link code should not read fields below their own
/// layer; nothing in this type enforces that, mirroring the original's single
/// C struct passed untyped between layers.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Network-layer source node id.
    pub srcid: u64,
    /// Network-layer destination node id.
    pub dstid: u64,
    /// Requested transmit power, set by the link-layer sender.
    pub pwr: f64,
    /// LLC sequence number. Zero means "this is an ack frame".
    pub seq: u16,
    /// LLC ack field: on a data frame this is unused (0); on an ack frame
    /// this echoes the sequence number being acknowledged.
    pub ack: u16,
    /// Power at which the radio actually received this frame, filled in by
    /// the radio layer on delivery (not meaningful on the sending side).
    pub received_power: f64,
    /// Set by the radio layer when a second transmission overlaps this one
    /// above the destination's sensitivity; a tainted reception is dropped
    /// rather than delivered upward.
    pub tainted: bool,
    /// The opaque application payload.
    pub data: Vec<u8>,
}

impl Frame {
    /// Start a new outbound frame with just a payload; header fields are
    /// filled in by each layer's send path as the frame descends.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// True if this frame is an LLC acknowledgement rather than a data frame.
    pub fn is_ack(&self) -> bool {
        self.seq == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frame_is_not_an_ack() {
        let frame = Frame::new(vec![1, 2, 3]);
        assert!(!frame.is_ack());
    }

    #[test]
    fn zero_sequence_marks_an_ack() {
        let mut frame = Frame::new(Vec::new());
        frame.seq = 0;
        frame.ack = 42;
        assert!(frame.is_ack());
    }
}
