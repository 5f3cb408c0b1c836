//! Mode string parsing shared by both backends.
//!
//! Mode strings follow the `fopen`/`gzopen` conventions: an access letter
//! (`r`, `w` or `a`) followed by modifier characters. Gzip-only modifiers
//! (compression level, transparent writing, strategy hints) are parsed here
//! and rejected by the plain backend.

use crate::error::{HandleError, Result};
use std::fs::OpenOptions;

/// Primary access requested by a mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `r`: read from the start of an existing file
    Read,
    /// `w`: truncate or create, then write
    Write,
    /// `a`: create if needed, every write goes to the end
    Append,
}

/// Deflate strategy hint from a gzip mode string (`f`, `h`, `R`, `F`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Filtered,
    HuffmanOnly,
    Rle,
    Fixed,
}

/// Parsed form of a mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: Access,
    /// `+`: open for both reading and writing
    pub update: bool,
    /// `x`: fail if the file already exists
    pub exclusive: bool,
    /// `0`-`9`: gzip compression level
    pub level: Option<u32>,
    /// `T`: write gzip output without compression
    pub transparent: bool,
    pub strategy: Option<Strategy>,
}

impl OpenMode {
    /// Parse a mode string such as `"rb"`, `"w+"`, `"wb9"` or `"ax"`
    pub fn parse(mode: &str) -> Result<Self> {
        let mut chars = mode.chars();
        let access = match chars.next() {
            Some('r') => Access::Read,
            Some('w') => Access::Write,
            Some('a') => Access::Append,
            Some(other) => {
                return Err(HandleError::invalid_mode(
                    mode,
                    format!("unknown access mode '{other}', expected 'r', 'w' or 'a'"),
                ))
            }
            None => return Err(HandleError::invalid_mode(mode, "mode string is empty")),
        };

        let mut parsed = Self {
            access,
            update: false,
            exclusive: false,
            level: None,
            transparent: false,
            strategy: None,
        };

        for c in chars {
            match c {
                '+' => parsed.update = true,
                'x' => parsed.exclusive = true,
                // binary/text and close-on-exec carry no meaning here
                'b' | 't' | 'e' => {}
                'T' => parsed.transparent = true,
                'f' => parsed.strategy = Some(Strategy::Filtered),
                'h' => parsed.strategy = Some(Strategy::HuffmanOnly),
                'R' => parsed.strategy = Some(Strategy::Rle),
                'F' => parsed.strategy = Some(Strategy::Fixed),
                d if d.is_ascii_digit() => parsed.level = d.to_digit(10),
                other => {
                    return Err(HandleError::invalid_mode(
                        mode,
                        format!("unknown mode character '{other}'"),
                    ))
                }
            }
        }

        if parsed.exclusive && parsed.access == Access::Read {
            return Err(HandleError::invalid_mode(
                mode,
                "'x' requires write or append access",
            ));
        }

        Ok(parsed)
    }

    /// First character of the mode that only a gzip stream understands
    pub fn gzip_only_flag(&self) -> Option<char> {
        if let Some(level) = self.level {
            return char::from_digit(level, 10);
        }
        if self.transparent {
            return Some('T');
        }
        self.strategy.map(|strategy| match strategy {
            Strategy::Filtered => 'f',
            Strategy::HuffmanOnly => 'h',
            Strategy::Rle => 'R',
            Strategy::Fixed => 'F',
        })
    }

    /// Whether the stream may be read from
    pub fn readable(&self) -> bool {
        self.access == Access::Read || self.update
    }

    /// Whether the stream may be written to
    pub fn writable(&self) -> bool {
        self.access != Access::Read || self.update
    }

    /// `OpenOptions` matching the `fopen` semantics of this mode
    pub fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.readable());
        match self.access {
            Access::Read => {
                options.write(self.update);
            }
            Access::Write => {
                options.write(true).truncate(true);
            }
            Access::Append => {
                options.append(true);
            }
        }
        if self.access != Access::Read {
            if self.exclusive {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }
        options
    }
}
