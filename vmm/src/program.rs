//! Program listings: the comma-separated on-disk representation

use std::fmt;
use std::fs;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;

use log::debug;

use crate::error::ProgramError;
use crate::value::Word;

/// Initial memory image of a processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    words: Vec<Word>,
}

impl Program {
    pub fn new(words: Vec<Word>) -> Self {
        Program { words }
    }

    /// Parse `1,2,3` style text; whitespace around words and empty tokens are ignored
    pub fn parse(listing: &str) -> Result<Self, ProgramError> {
        let mut words = Vec::new();
        for (index, token) in listing.split(',').enumerate() {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let word = token.parse::<Word>().map_err(|_| ProgramError::InvalidWord {
                index,
                token: token.to_string(),
            })?;
            words.push(word);
        }
        if words.is_empty() {
            return Err(ProgramError::Empty);
        }
        Ok(Program { words })
    }

    /// Load the listing on the first line of `path`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let program = Self::parse(content.lines().next().unwrap_or(""))?;
        debug!("loaded {} words from {}", program.len(), path.display());
        Ok(program)
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Copy of this program with `addr` set to `value`, growing with zeros if needed
    pub fn patch(&self, addr: usize, value: Word) -> Self {
        let mut words = self.words.clone();
        if addr >= words.len() {
            words.resize(addr + 1, 0);
        }
        words[addr] = value;
        Program { words }
    }
}

impl Deref for Program {
    type Target = [Word];

    fn deref(&self) -> &[Word] {
        &self.words
    }
}

impl From<Vec<Word>> for Program {
    fn from(words: Vec<Word>) -> Self {
        Program::new(words)
    }
}

impl FromStr for Program {
    type Err = ProgramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", word)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_listing() {
        let program: Program = " 1,0, 0,3,\n99,-7,\n".parse().unwrap();
        assert_eq!(program.words(), &[1, 0, 0, 3, 99, -7]);
        assert_eq!(program.to_string(), "1,0,0,3,99,-7");
    }

    #[test]
    fn test_parse_errors() {
        match Program::parse("1,2,x3,4") {
            Err(ProgramError::InvalidWord { index, token }) => {
                assert_eq!(index, 2);
                assert_eq!(token, "x3");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(Program::parse(" , \n"), Err(ProgramError::Empty)));
    }

    #[test]
    fn test_patch_leaves_original_untouched() {
        let program = Program::new(vec![1, 0, 0, 0, 99]);
        let patched = program.patch(1, 12).patch(2, 2);
        assert_eq!(program.words(), &[1, 0, 0, 0, 99]);
        assert_eq!(patched.words(), &[1, 12, 2, 0, 99]);
        assert_eq!(program.patch(7, 5).len(), 8);
    }

    #[test]
    fn test_from_file_reads_first_line() {
        let path = std::env::temp_dir().join(format!("vmm-program-{}.txt", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            writeln!(file, "104,1125899906842624,99").unwrap();
            writeln!(file, "this line is ignored").unwrap();
        }
        let program = Program::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(program.words(), &[104, 1125899906842624, 99]);
    }

    #[test]
    fn test_missing_file() {
        let err = Program::from_file("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, ProgramError::Io(_)));
    }
}
