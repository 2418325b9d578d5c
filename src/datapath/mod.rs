//! Datapath nodes
//!
//! Run-to-completion packet transforms executed by the forwarding workers.
//! Nodes read the published neighbor view and the immutable interface
//! inventory; they never touch control-plane state directly. Each node
//! names its drop edges so the metrics registry can count per-edge drops.

pub mod ip6_output;
pub mod na_input;
pub mod ns_input;
pub mod ns_output;
mod packet;
mod rx;
mod view;

pub use ip6_output::{Ip6Output, Ip6OutputAction};
pub use na_input::NaInputAction;
pub use ns_input::NsInputAction;
pub use packet::{LocalMeta, Packet, TxFrame};
pub use rx::{classify, RxVerdict};
pub use view::{NeighborView, NhView, SharedNeighborView};
