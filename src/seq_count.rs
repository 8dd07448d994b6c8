//! Wrapping counters for packet sequence counts and VCDU frame counts.
use crate::ccsds::MAX_SEQ_COUNT;
use core::cell::Cell;
use paste::paste;

/// Largest value of the 24-bit VCDU frame counter.
pub const MAX_VCDU_COUNT: u32 = 2u32.pow(24) - 1;

/// Core trait for objects which can provide a sequence count.
///
/// The core functions are not mutable on purpose to allow easier usage with
/// shared owners when using the interior mutability pattern. This can be achieved by using
/// [Cell], [core::cell::RefCell] or atomic types.
pub trait SequenceCountProvider {
    type Raw: Into<u64>;
    const MAX_BIT_WIDTH: usize;

    fn get(&self) -> Self::Raw;

    fn increment(&self);

    fn get_and_increment(&self) -> Self::Raw {
        let val = self.get();
        self.increment();
        val
    }
}

/// Counter which wraps back to zero after reaching its configured maximum value.
#[derive(Debug, Clone)]
pub struct SeqCountProviderSimple<T: Copy> {
    seq_count: Cell<T>,
    max_val: T,
}

macro_rules! impl_for_primitives {
    ($($ty: ident,)+) => {
        $(
            paste! {
                impl SeqCountProviderSimple<$ty> {
                    pub fn [<new_custom_max_val_ $ty>](max_val: $ty) -> Self {
                        Self {
                            seq_count: Cell::new(0),
                            max_val,
                        }
                    }

                    /// Resume counting at `start`. Values above `max_val` restart at zero.
                    pub fn [<resume_ $ty>](start: $ty, max_val: $ty) -> Self {
                        Self {
                            seq_count: Cell::new(if start > max_val { 0 } else { start }),
                            max_val,
                        }
                    }

                    pub fn [<new_ $ty>]() -> Self {
                        Self {
                            seq_count: Cell::new(0),
                            max_val: $ty::MAX
                        }
                    }

                    pub fn max_val(&self) -> $ty {
                        self.max_val
                    }
                }

                impl Default for SeqCountProviderSimple<$ty> {
                    fn default() -> Self {
                        Self::[<new_ $ty>]()
                    }
                }

                impl SequenceCountProvider for SeqCountProviderSimple<$ty> {
                    type Raw = $ty;
                    const MAX_BIT_WIDTH: usize = core::mem::size_of::<Self::Raw>() * 8;

                    fn get(&self) -> Self::Raw {
                        self.seq_count.get()
                    }

                    fn increment(&self) {
                        self.get_and_increment();
                    }

                    fn get_and_increment(&self) -> Self::Raw {
                        let curr_count = self.seq_count.get();

                        if curr_count >= self.max_val {
                            self.seq_count.set(0);
                        } else {
                            self.seq_count.set(curr_count + 1);
                        }
                        curr_count
                    }
                }
            }
        )+
    }
}

impl_for_primitives!(u16, u32,);

/// This is a sequence count provider which wraps around at [MAX_SEQ_COUNT].
#[derive(Debug, Clone)]
pub struct CcsdsSimpleSeqCountProvider {
    provider: SeqCountProviderSimple<u16>,
}

impl CcsdsSimpleSeqCountProvider {
    /// Continue a count persisted by a previous run.
    pub fn resume(start: u16) -> Self {
        Self {
            provider: SeqCountProviderSimple::resume_u16(start, MAX_SEQ_COUNT),
        }
    }
}

impl Default for CcsdsSimpleSeqCountProvider {
    fn default() -> Self {
        Self {
            provider: SeqCountProviderSimple::new_custom_max_val_u16(MAX_SEQ_COUNT),
        }
    }
}

impl SequenceCountProvider for CcsdsSimpleSeqCountProvider {
    type Raw = u16;
    const MAX_BIT_WIDTH: usize = 14;
    delegate::delegate! {
        to self.provider {
            fn get(&self) -> u16;
            fn increment(&self);
            fn get_and_increment(&self) -> u16;
        }
    }
}

/// 24-bit virtual channel frame counter which wraps around at [MAX_VCDU_COUNT].
#[derive(Debug, Clone)]
pub struct VcduFrameCounter {
    provider: SeqCountProviderSimple<u32>,
}

impl VcduFrameCounter {
    pub fn resume(start: u32) -> Self {
        Self {
            provider: SeqCountProviderSimple::resume_u32(start, MAX_VCDU_COUNT),
        }
    }
}

impl Default for VcduFrameCounter {
    fn default() -> Self {
        Self {
            provider: SeqCountProviderSimple::new_custom_max_val_u32(MAX_VCDU_COUNT),
        }
    }
}

impl SequenceCountProvider for VcduFrameCounter {
    type Raw = u32;
    const MAX_BIT_WIDTH: usize = 24;
    delegate::delegate! {
        to self.provider {
            fn get(&self) -> u32;
            fn increment(&self);
            fn get_and_increment(&self) -> u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ccsds::MAX_SEQ_COUNT;
    use crate::seq_count::{
        CcsdsSimpleSeqCountProvider, SeqCountProviderSimple, SequenceCountProvider,
        VcduFrameCounter, MAX_VCDU_COUNT,
    };

    #[test]
    fn test_u16_counter() {
        let u16_counter = SeqCountProviderSimple::<u16>::default();
        assert_eq!(u16_counter.get(), 0);
        assert_eq!(u16_counter.get_and_increment(), 0);
        assert_eq!(u16_counter.get_and_increment(), 1);
        assert_eq!(u16_counter.get(), 2);
    }

    #[test]
    fn test_ccsds_counter() {
        let ccsds_counter = CcsdsSimpleSeqCountProvider::default();
        assert_eq!(ccsds_counter.get(), 0);
        assert_eq!(ccsds_counter.get_and_increment(), 0);
        assert_eq!(ccsds_counter.get_and_increment(), 1);
        assert_eq!(ccsds_counter.get(), 2);
    }

    #[test]
    fn test_ccsds_counter_wraps_at_14_bits() {
        let ccsds_counter = CcsdsSimpleSeqCountProvider::resume(16383);
        assert_eq!(ccsds_counter.get_and_increment(), 16383);
        assert_eq!(ccsds_counter.get(), 0);
    }

    #[test]
    fn test_ccsds_counter_overflow() {
        let ccsds_counter = CcsdsSimpleSeqCountProvider::default();
        for _ in 0..MAX_SEQ_COUNT + 1 {
            ccsds_counter.increment();
        }
        assert_eq!(ccsds_counter.get(), 0);
    }

    #[test]
    fn test_resume_out_of_range_restarts() {
        let ccsds_counter = CcsdsSimpleSeqCountProvider::resume(20000);
        assert_eq!(ccsds_counter.get(), 0);
    }

    #[test]
    fn test_vcdu_counter_wraps_at_24_bits() {
        let counter = VcduFrameCounter::resume(MAX_VCDU_COUNT);
        assert_eq!(counter.get(), 16_777_215);
        counter.increment();
        assert_eq!(counter.get(), 0);
        counter.increment();
        assert_eq!(counter.get(), 1);
    }
}
