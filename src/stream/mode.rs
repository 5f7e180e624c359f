use std::{fmt, fs::OpenOptions, str::FromStr};

use crate::error::StreamError;

/// An fopen-style file mode such as `"r"`, `"w+"` or `"ab"`.
///
/// The binary (`b`) and text (`t`) flags are accepted and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    kind: ModeKind,
    plus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeKind {
    Read,
    Write,
    Append,
    CreateNew,
    Create,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode {
        kind: ModeKind::Read,
        plus: false,
    };

    pub fn is_readable(&self) -> bool {
        self.kind == ModeKind::Read || self.plus
    }

    pub fn is_writable(&self) -> bool {
        self.kind != ModeKind::Read || self.plus
    }

    /// Whether opening the file again with this mode leaves its contents
    /// untouched.
    pub fn is_read_only(&self) -> bool {
        *self == Self::READ
    }

    /// Open options equivalent to this mode.
    pub fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.is_readable());
        match self.kind {
            ModeKind::Read => {
                options.write(self.plus);
            }
            ModeKind::Write => {
                options.write(true).create(true).truncate(true);
            }
            ModeKind::Append => {
                options.append(true).create(true);
            }
            ModeKind::CreateNew => {
                options.write(true).create_new(true);
            }
            ModeKind::Create => {
                options.write(true).create(true);
            }
        }
        options
    }
}

impl FromStr for OpenMode {
    type Err = StreamError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        let invalid = || StreamError::InvalidMode(mode.to_owned());

        let mut chars = mode.chars();
        let kind = match chars.next() {
            Some('r') => ModeKind::Read,
            Some('w') => ModeKind::Write,
            Some('a') => ModeKind::Append,
            Some('x') => ModeKind::CreateNew,
            Some('c') => ModeKind::Create,
            _ => return Err(invalid()),
        };

        let mut plus = false;
        for flag in chars {
            match flag {
                '+' if !plus => plus = true,
                'b' | 't' => {}
                _ => return Err(invalid()),
            }
        }

        Ok(OpenMode { kind, plus })
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ModeKind::Read => "r",
            ModeKind::Write => "w",
            ModeKind::Append => "a",
            ModeKind::CreateNew => "x",
            ModeKind::Create => "c",
        };
        f.write_str(kind)?;
        if self.plus {
            f.write_str("+")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_with_flags() {
        let mode: OpenMode = "rb".parse().unwrap();
        assert!(mode.is_read_only());

        let mode: OpenMode = "w+".parse().unwrap();
        assert!(mode.is_readable());
        assert!(mode.is_writable());
        assert_eq!(mode.to_string(), "w+");

        let mode: OpenMode = "a".parse().unwrap();
        assert!(!mode.is_readable());
    }

    #[test]
    fn rejects_unknown_modes() {
        assert!(matches!(
            "q".parse::<OpenMode>(),
            Err(StreamError::InvalidMode(_))
        ));
        assert!("r++".parse::<OpenMode>().is_err());
        assert!("".parse::<OpenMode>().is_err());
    }
}
