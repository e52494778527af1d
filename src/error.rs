use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

// Status codes shared with the firmware. Zero is success and positive
// codes are firmware application errors; the negative ranges below are
// part of the wire contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(i8)]
pub enum ErrorCode {
    NoError = 0,

    // Envelope layer
    EnvelopeTooLong = -1,
    EnvelopeInvalidId = -2,
    EnvelopeInvalidCrc = -3,
    EnvelopeCrcMismatch = -4,
    EnvelopeExpectedEnd = -5,
    EnvelopeMissingMetadata = -6,
    EnvelopeInvalidDummyMetadata = -7,

    // Request grammar, reported by the firmware
    UnexpectedChar = -8,
    VectorTooLong = -9,
    ValueOutOfRange = -10,
    StringTooLong = -11,
    InvalidString = -12,
    TooManyStrings = -13,
    InvalidOpcode = -14,

    // Dispatcher, reported by the firmware
    Duplicate = -15,
    UnknownOpcode = -16,
    BadNumberOfArguments = -17,
    MissingString = -18,
    BadString = -19,
    BadHandler = -20,

    // Synthesized by the client
    ClientInvalidOpcode = -21,
    ClientTooLong = -22,
    ConnectionTimeout = -23,
    EmptyRequest = -24,
    EmptyResponse = -25,
    InvalidJson = -26,
    InvalidResponse = -27,
    InvalidErrorResponse = -28,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn message(self) -> &'static str {
        error_message(self as i32)
    }
}

// The envelope-layer codes that warrant retransmitting the request.
// The firmware de-duplicates by request id, so a retry is safe even
// when the original actually arrived.
pub fn is_envelope_error(code: i32) -> bool {
    matches!(
        ErrorCode::from_i32(code),
        Some(
            ErrorCode::EnvelopeCrcMismatch
                | ErrorCode::EnvelopeInvalidId
                | ErrorCode::EnvelopeInvalidCrc
                | ErrorCode::EnvelopeExpectedEnd
                | ErrorCode::EnvelopeTooLong
                | ErrorCode::EnvelopeMissingMetadata
        )
    )
}

pub fn error_message(code: i32) -> &'static str {
    use ErrorCode::*;
    match ErrorCode::from_i32(code) {
        Some(NoError) => "No error",

        Some(EnvelopeTooLong) => "Request too long",
        Some(EnvelopeInvalidId) => "Invalid ID in request envelope",
        Some(EnvelopeInvalidCrc) => "Invalid CRC in request envelope",
        Some(EnvelopeCrcMismatch) => "CRC mismatch in request envelope",
        Some(EnvelopeExpectedEnd) => "Expected the end of the request envelope",
        Some(EnvelopeMissingMetadata) => "Request envelope has no metadata",
        Some(EnvelopeInvalidDummyMetadata) => "Request envelope invalid dummy metadata",

        Some(UnexpectedChar) => "Unexpected character in request",
        Some(VectorTooLong) => "Too many arguments",
        Some(ValueOutOfRange) => "Value out of range",
        Some(StringTooLong) => "String too long",
        Some(InvalidString) => "Invalid string",
        Some(TooManyStrings) => "Too many strings",
        Some(InvalidOpcode) => "Invalid opcode",

        Some(Duplicate) => "Duplicate message",
        Some(UnknownOpcode) => "Unknown opcode",
        Some(BadNumberOfArguments) => "Bad number of arguments",
        Some(MissingString) => "Missing string argument",
        Some(BadString) => "Bad string",
        Some(BadHandler) => "Corrupt request handler",

        Some(ClientInvalidOpcode) => "Invalid opcode",
        Some(ClientTooLong) => "Request too long",
        Some(ConnectionTimeout) => "The connection timed out",
        Some(EmptyRequest) => "Null or zero-length request",
        Some(EmptyResponse) => "Null or zero-length response",
        Some(InvalidJson) => "Invalid JSON",
        Some(InvalidResponse) => "Response is badly formed",
        Some(InvalidErrorResponse) => "Response contains an invalid error message",

        None if code > 0 => "Application error",
        None => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        assert_eq!(ErrorCode::from_i32(-4), Some(ErrorCode::EnvelopeCrcMismatch));
        assert_eq!(ErrorCode::from_i32(-23), Some(ErrorCode::ConnectionTimeout));
        assert_eq!(ErrorCode::ConnectionTimeout.code(), -23);
        assert_eq!(ErrorCode::from_i32(1), None);
    }

    #[test]
    fn retry_set_covers_envelope_codes_only() {
        for code in [-1, -2, -3, -4, -5, -6] {
            assert!(is_envelope_error(code), "{} should be retried", code);
        }
        for code in [-7, -8, -15, -23, 0, 5] {
            assert!(!is_envelope_error(code), "{} should not be retried", code);
        }
    }

    #[test]
    fn messages_for_unknown_codes() {
        assert_eq!(error_message(42), "Application error");
        assert_eq!(error_message(-99), "Unknown error code");
        assert_eq!(error_message(-23), "The connection timed out");
    }
}
