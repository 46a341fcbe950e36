//! Golden vectors for the engine envelope.
//!
//! The engine decodes these bytes with its own protobuf implementation, so
//! they must never change for an unchanged message. A failing vector means
//! a wire break, not a test to update.

use arena_protocol::{
    BattleResult, Context, ContextCodec, FixedBuffer, Output, ProtocolError, UserOp,
    INPUT_BUFFER_SIZE,
};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[test]
fn test_user_op_envelope_bytes() {
    let input = UserOp {
        team_id: 100,
        action: 1,
        value: 7,
    }
    .into();
    let mut buffer = FixedBuffer::new(INPUT_BUFFER_SIZE);
    let written = ContextCodec::build_input(1000, 5, &input, &mut buffer).unwrap();

    assert_eq!(written, 15);
    assert_eq!(hex(buffer.as_bytes()), "08e80710051a082206086410011807");
}

#[test]
fn test_battle_result_envelope_bytes() {
    let output: Output = BattleResult {
        winner: 100,
        loser: 101,
        atk_damage: 0,
        def_damage: 0,
        duration_ms: 0,
        score: 100,
    }
    .into();
    let bytes = ContextCodec::encode_output(1000, 0, output).unwrap();

    // session_id, then Output { Result { winner, loser, score } }; zero
    // scalars are omitted on the wire.
    assert_eq!(hex(&bytes), "08e80722080a06086410653064");
}

#[test]
fn test_decodes_foreign_bytes() {
    let bytes = [
        0x08, 0xE8, 0x07, 0x10, 0x05, 0x1A, 0x08, 0x22, 0x06, 0x08, 0x64, 0x10, 0x01, 0x18, 0x07,
    ];
    let envelope = ContextCodec::parse_input(&bytes).unwrap();
    assert_eq!(
        envelope,
        Context::with_input(
            1000,
            5,
            UserOp {
                team_id: 100,
                action: 1,
                value: 7,
            }
            .into()
        )
    );
}

#[test]
fn test_capacity_is_never_truncated() {
    let input = UserOp {
        team_id: 100,
        action: 1,
        value: 7,
    }
    .into();
    let mut buffer = FixedBuffer::new(14);
    assert_eq!(
        ContextCodec::build_input(1000, 5, &input, &mut buffer),
        Err(ProtocolError::CapacityExceeded {
            required: 15,
            capacity: 14,
        })
    );
    assert!(buffer.as_bytes().is_empty());
}
