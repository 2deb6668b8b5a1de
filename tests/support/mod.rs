#![allow(dead_code, unused_imports)]

pub mod external;
pub mod hub;
pub mod rig;

pub use external::FakeSecondSide;
pub use hub::TestHub;
pub use rig::{WalletRig, add_blocks, pump};
