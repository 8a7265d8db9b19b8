//! Metrics and log events emitted by the admission guards.
//!
//! Each event registers its metric handles once, when the owning breaker or
//! limiter is built, and `emit` only touches those handles afterwards.

/// Declares an event together with its registered handle.
///
/// `Event.register()` resolves every metric once and returns `EventHandle`,
/// whose `emit` records one occurrence.
macro_rules! registered_event {
    (
        $event:ident => {
            $( $field:ident: $type:ty = $value:expr, )*
        }

        fn emit(&$slf:ident, $data_name:ident: $data:ty) $emit_body:block
    ) => {
        paste::paste! {
            #[derive(Clone, Copy, Debug, Default)]
            pub struct $event;

            #[derive(Clone)]
            pub struct [<$event Handle>] {
                $( $field: $type, )*
            }

            impl $event {
                pub fn register(self) -> [<$event Handle>] {
                    [<$event Handle>] {
                        $( $field: $value, )*
                    }
                }
            }

            impl [<$event Handle>] {
                pub fn emit(&$slf, $data_name: $data) $emit_body
            }

            impl std::fmt::Debug for [<$event Handle>] {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.debug_struct(stringify!([<$event Handle>])).finish_non_exhaustive()
                }
            }
        }
    };
}

mod bbr;
mod circuit_breaker;
mod cpu;

pub use bbr::*;
pub use circuit_breaker::*;
pub use cpu::*;
