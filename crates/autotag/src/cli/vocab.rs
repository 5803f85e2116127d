//! The `autotag vocab` command for inspecting a keyword vocabulary.

use std::io::{self, Write};
use std::path::PathBuf;

use autotag_core::Vocabulary;
use clap::Args;

/// Arguments for the `vocab` command.
#[derive(Args, Debug)]
pub struct VocabArgs {
    /// Vocabulary file (Lightroom keyword export format)
    pub file: PathBuf,

    /// Print every term, one per line
    #[arg(long)]
    pub list: bool,
}

/// Execute the vocab command.
pub fn execute(args: VocabArgs) -> anyhow::Result<()> {
    let vocabulary = Vocabulary::load(&args.file)?;
    let stdout = io::stdout();
    report(&vocabulary, args.list, &mut stdout.lock())?;
    Ok(())
}

fn report<W: Write>(vocabulary: &Vocabulary, list: bool, out: &mut W) -> io::Result<()> {
    if list {
        for term in vocabulary.terms() {
            writeln!(out, "{term}")?;
        }
    } else {
        writeln!(out, "{} terms", vocabulary.len())?;
    }
    Ok(())
}
