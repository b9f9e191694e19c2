use std::io::Write;

/// Where console text from a running program goes.
pub trait WriteTarget {
    fn print(&mut self, text: &str);
    /// Print `text` followed by a newline.
    fn println(&mut self, text: &str) {
        self.print(text);
        self.print("\n");
    }
}

/// Standard output.
#[derive(Debug, Default)]
pub struct Console;

impl WriteTarget for Console {
    fn print(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            log::warn!("Couldn't write program output: {error}");
        }
    }
}

/// Capture everything in memory.
impl WriteTarget for String {
    fn print(&mut self, text: &str) {
        self.push_str(text);
    }
}

impl<T: WriteTarget + ?Sized> WriteTarget for &mut T {
    fn print(&mut self, text: &str) {
        (**self).print(text);
    }
}
