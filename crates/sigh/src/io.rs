use std::io::{self, Write as _};

/// Trait for handling output from the `print` built-in.
///
/// Implement this to capture or redirect print output from interpreted
/// programs. Writers must be `Send` when the program launches async
/// functions, since those run on their own OS threads and share the writer
/// behind a lock.
pub trait PrintWriter {
    /// Writes one formatted argument, without any terminator.
    fn write(&mut self, text: &str);

    /// Writes the terminator (`print` appends a newline).
    fn push(&mut self, end: char);
}

/// Default `PrintWriter` that writes straight to stdout.
///
/// Write failures are ignored; stdout going away mid-program is not an
/// interpreter error.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write(&mut self, text: &str) {
        let _ = io::stdout().write_all(text.as_bytes());
    }

    fn push(&mut self, end: char) {
        let mut buffer = [0_u8; 4];
        let _ = io::stdout().write_all(end.encode_utf8(&mut buffer).as_bytes());
        let _ = io::stdout().flush();
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing print output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected output so far.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write(&mut self, text: &str) {
        self.0.push_str(text);
    }

    fn push(&mut self, end: char) {
        self.0.push(end);
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write(&mut self, _text: &str) {}

    fn push(&mut self, _end: char) {}
}
