//! Declarative table macros shared across the crate.

/// Defines numeric error code constants together with a lookup for their messages.
macro_rules! define_error_codes {
    ($($name:ident = $code:literal => $msg:expr),* $(,)?) => {
        $(pub const $name: u32 = $code;)*

        /// Returns the human readable message for an error code.
        pub fn get_error_message(code: u32) -> &'static str {
            match code {
                $($code => $msg,)*
                _ => "Unknown Error",
            }
        }
    };
}

/// Defines the weekday enum from `Variant = (bit, "token")` entries.
///
/// The bit index doubles as the enum discriminant and as the position in `Weekday::ALL`.
macro_rules! define_weekday {
    ($($variant:ident = ($bit:literal, $token:literal)),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        #[repr(u8)]
        pub enum Weekday {
            $($variant = $bit,)*
        }

        impl Weekday {
            /// All weekdays in mask bit order (sun..sat).
            pub const ALL: [Weekday; 7] = [$(Weekday::$variant,)*];

            /// Canonical three-letter token.
            pub fn token(self) -> &'static str {
                match self {
                    $(Weekday::$variant => $token,)*
                }
            }

            /// Bit position inside the day mask.
            pub fn bit(self) -> u8 {
                self as u8
            }

            fn from_canonical(token: &str) -> Option<Self> {
                match token {
                    $($token => Some(Weekday::$variant),)*
                    _ => None,
                }
            }
        }
    };
}
