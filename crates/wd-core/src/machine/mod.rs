//! Connection state machine.
//!
//! 连接状态机:纯函数式状态转换,由 wd-service 的编排循环执行副作用。
//!
//! The machine is a pure function from `(state, input)` to
//! `(next_state, actions)`. HAL calls, timers, notifications and store
//! updates are all expressed as [`Action`] values; the driving loop executes
//! them and feeds HAL results back in as ordinary inputs, so processing stays
//! totally ordered and deterministic under test.

mod state;
mod transition;

pub use state::{IncomingNegotiation, P2pState, PendingConnect};
pub use transition::{
    Action, ConnectionStateMachine, HalRequest, MachineCommand, MachineInput, MachineTimeouts,
    TimerKind,
};
