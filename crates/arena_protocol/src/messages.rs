//! Protocol buffer message types exchanged with the simulation engine.
//!
//! The structs in `generated` mirror `arena.battle.v1` field for field and
//! tag for tag. Changing a tag or a scalar type is a wire break.
//!
//! # Message Categories
//!
//! - **Envelope**: [`Context`], [`EnvelopeKind`]
//! - **Input commands**: [`Input`], [`UseItem`], [`Pause`], [`Resume`], [`UserOp`]
//! - **Output events**: [`Output`], [`BattleResult`], [`Replay`], [`ReplayEvent`]
//! - **Session parameters**: [`SessionEnv`], [`Team`]

#[allow(
    clippy::derive_partial_eq_without_eq,
    clippy::doc_markdown,
    clippy::struct_field_names,
    missing_docs
)]
mod generated {
    /// Envelope for everything crossing the engine boundary.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Context {
        #[prost(uint32, tag = "1")]
        pub session_id: u32,
        #[prost(uint64, tag = "2")]
        pub frame: u64,
        #[prost(oneof = "context::Body", tags = "3, 4")]
        pub body: ::core::option::Option<context::Body>,
    }

    /// Nested message and enum types in `Context`.
    pub mod context {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Body {
            #[prost(message, tag = "3")]
            Input(super::Input),
            #[prost(message, tag = "4")]
            Output(super::Output),
        }
    }

    /// A command travelling towards the engine.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Input {
        #[prost(oneof = "input::Op", tags = "1, 2, 3, 4")]
        pub op: ::core::option::Option<input::Op>,
    }

    /// Nested message and enum types in `Input`.
    pub mod input {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Op {
            #[prost(message, tag = "1")]
            UseItem(super::UseItem),
            #[prost(message, tag = "2")]
            Pause(super::Pause),
            #[prost(message, tag = "3")]
            Resume(super::Resume),
            #[prost(message, tag = "4")]
            UserOp(super::UserOp),
        }
    }

    /// An event travelling back from the engine.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Output {
        #[prost(oneof = "output::Event", tags = "1, 2")]
        pub event: ::core::option::Option<output::Event>,
    }

    /// Nested message and enum types in `Output`.
    pub mod output {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Event {
            #[prost(message, tag = "1")]
            Result(super::BattleResult),
            #[prost(message, tag = "2")]
            Replay(super::Replay),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UseItem {
        #[prost(uint32, tag = "1")]
        pub team_id: u32,
        #[prost(uint32, tag = "2")]
        pub item_id: u32,
        #[prost(uint32, tag = "3")]
        pub target_id: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Pause {
        #[prost(uint32, tag = "1")]
        pub team_id: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Resume {
        #[prost(uint32, tag = "1")]
        pub team_id: u32,
    }

    /// Free-form player action. The engine interprets `action`.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UserOp {
        #[prost(uint32, tag = "1")]
        pub team_id: u32,
        #[prost(uint32, tag = "2")]
        pub action: u32,
        #[prost(int32, tag = "3")]
        pub value: i32,
    }

    /// Opaque team reference.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Team {
        #[prost(uint32, tag = "1")]
        pub team_id: u32,
    }

    /// Immutable parameters a session is created with.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SessionEnv {
        #[prost(uint32, tag = "1")]
        pub session_id: u32,
        #[prost(message, optional, tag = "2")]
        pub atk: ::core::option::Option<Team>,
        #[prost(message, optional, tag = "3")]
        pub def: ::core::option::Option<Team>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BattleResult {
        #[prost(uint32, tag = "1")]
        pub winner: u32,
        #[prost(uint32, tag = "2")]
        pub loser: u32,
        #[prost(int32, tag = "3")]
        pub atk_damage: i32,
        #[prost(int32, tag = "4")]
        pub def_damage: i32,
        #[prost(int64, tag = "5")]
        pub duration_ms: i64,
        #[prost(int32, tag = "6")]
        pub score: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ReplayEvent {
        #[prost(int64, tag = "1")]
        pub timestamp_ms: i64,
        #[prost(string, tag = "2")]
        pub event_type: ::prost::alloc::string::String,
        #[prost(uint32, tag = "3")]
        pub performer_id: u32,
        #[prost(uint32, tag = "4")]
        pub target_id: u32,
        #[prost(int32, tag = "5")]
        pub value: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Replay {
        #[prost(uint32, tag = "1")]
        pub session_id: u32,
        #[prost(int64, tag = "2")]
        pub start_time_ms: i64,
        #[prost(int64, tag = "3")]
        pub end_time_ms: i64,
        #[prost(message, optional, tag = "4")]
        pub atk: ::core::option::Option<Team>,
        #[prost(message, optional, tag = "5")]
        pub def: ::core::option::Option<Team>,
        #[prost(message, optional, tag = "6")]
        pub result: ::core::option::Option<BattleResult>,
        #[prost(message, repeated, tag = "7")]
        pub events: ::prost::alloc::vec::Vec<ReplayEvent>,
        #[prost(string, tag = "8")]
        pub version: ::prost::alloc::string::String,
    }
}

pub use generated::*;

// ============================================================================
// ENVELOPE HELPERS
// ============================================================================

/// Which half of the oneof an envelope carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// A command for the engine.
    Input,
    /// A result or replay from the engine.
    Output,
}

impl EnvelopeKind {
    /// Lowercase name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Context {
    /// Builds an input envelope.
    #[must_use]
    pub fn with_input(session_id: u32, frame: u64, input: Input) -> Self {
        Self {
            session_id,
            frame,
            body: Some(context::Body::Input(input)),
        }
    }

    /// Builds an output envelope.
    #[must_use]
    pub fn with_output(session_id: u32, frame: u64, output: Output) -> Self {
        Self {
            session_id,
            frame,
            body: Some(context::Body::Output(output)),
        }
    }

    /// Returns the populated half, or `None` for a malformed envelope.
    ///
    /// An envelope is well-formed only when the body is set AND the inner
    /// oneof is set too.
    #[must_use]
    pub fn kind(&self) -> Option<EnvelopeKind> {
        match &self.body {
            Some(context::Body::Input(input)) if input.op.is_some() => Some(EnvelopeKind::Input),
            Some(context::Body::Output(output)) if output.event.is_some() => {
                Some(EnvelopeKind::Output)
            }
            _ => None,
        }
    }

    /// The input command, if this is an input envelope.
    #[must_use]
    pub fn as_input(&self) -> Option<&Input> {
        match &self.body {
            Some(context::Body::Input(input)) => Some(input),
            _ => None,
        }
    }

    /// The output event, if this is an output envelope.
    #[must_use]
    pub fn as_output(&self) -> Option<&Output> {
        match &self.body {
            Some(context::Body::Output(output)) => Some(output),
            _ => None,
        }
    }
}

impl Input {
    /// Variant name, for logs.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match &self.op {
            Some(input::Op::UseItem(_)) => "use_item",
            Some(input::Op::Pause(_)) => "pause",
            Some(input::Op::Resume(_)) => "resume",
            Some(input::Op::UserOp(_)) => "user_op",
            None => "none",
        }
    }
}

impl Output {
    /// Variant name, for logs.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match &self.event {
            Some(output::Event::Result(_)) => "result",
            Some(output::Event::Replay(_)) => "replay",
            None => "none",
        }
    }
}

impl SessionEnv {
    /// Builds session parameters from two team references.
    #[must_use]
    pub fn new(session_id: u32, atk_team: u32, def_team: u32) -> Self {
        Self {
            session_id,
            atk: Some(Team { team_id: atk_team }),
            def: Some(Team { team_id: def_team }),
        }
    }

    /// Attacking team id (0 when unset).
    #[must_use]
    pub fn atk_team(&self) -> u32 {
        self.atk.as_ref().map_or(0, |team| team.team_id)
    }

    /// Defending team id (0 when unset).
    #[must_use]
    pub fn def_team(&self) -> u32 {
        self.def.as_ref().map_or(0, |team| team.team_id)
    }
}

macro_rules! impl_into_input {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Input {
                fn from(value: $ty) -> Self {
                    Self { op: Some(input::Op::$ty(value)) }
                }
            }
        )*
    };
}

impl_into_input!(UseItem, Pause, Resume, UserOp);

impl From<BattleResult> for Output {
    fn from(value: BattleResult) -> Self {
        Self {
            event: Some(output::Event::Result(value)),
        }
    }
}

impl From<Replay> for Output {
    fn from(value: Replay) -> Self {
        Self {
            event: Some(output::Event::Replay(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_requires_inner_variant() {
        let empty = Context::with_input(1, 0, Input::default());
        assert_eq!(empty.kind(), None);

        let input = Context::with_input(1, 0, Pause { team_id: 7 }.into());
        assert_eq!(input.kind(), Some(EnvelopeKind::Input));

        let output = Context::with_output(1, 0, BattleResult::default().into());
        assert_eq!(output.kind(), Some(EnvelopeKind::Output));

        let bare = Context {
            session_id: 1,
            frame: 0,
            body: None,
        };
        assert_eq!(bare.kind(), None);
    }

    #[test]
    fn test_variant_names() {
        let input: Input = UserOp {
            team_id: 1,
            action: 0,
            value: 0,
        }
        .into();
        assert_eq!(input.variant_name(), "user_op");

        let output: Output = Replay::default().into();
        assert_eq!(output.variant_name(), "replay");
        assert_eq!(Output::default().variant_name(), "none");
    }

    #[test]
    fn test_session_env_teams() {
        let env = SessionEnv::new(1000, 100, 101);
        assert_eq!(env.atk_team(), 100);
        assert_eq!(env.def_team(), 101);
        assert_eq!(SessionEnv::default().atk_team(), 0);
    }
}
