use std::io::{self, Write};

/// Prints `message` to stdout and copies it to `writer` when one is given.
pub fn println(message: &str, writer: &mut Option<&mut dyn Write>) -> io::Result<()> {
    if let Err(e) = writeln!(io::stdout(), "{message}") {
        tracing::warn!(error = %e, "failed to write to stdout");
    }

    if let Some(w) = writer {
        writeln!(w, "{message}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_println_copies_to_writer() {
        let mut captured = Vec::new();
        {
            let mut writer: Option<&mut dyn Write> = Some(&mut captured);
            println("hello", &mut writer).unwrap();
            println("world", &mut writer).unwrap();
        }
        assert_eq!(String::from_utf8(captured).unwrap(), "hello\nworld\n");
    }

    #[test]
    fn test_println_without_writer() {
        assert!(println("only stdout", &mut None).is_ok());
    }
}
