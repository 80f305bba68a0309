use std::io::{self, IsTerminal, Write};

use tracing::debug;

/// Outcome messages for the user, written to the error stream handed in.
#[derive(Debug, Clone)]
pub struct Notifier {
    color: bool,
}

impl Notifier {
    pub fn new(color: bool) -> Self {
        Self {
            color: color && io::stderr().is_terminal(),
        }
    }

    pub fn success(&self, err: &mut dyn Write, message: &str) {
        debug!(message, "notify success");
        if let Err(error) = self.write_success(err, message) {
            debug!(error = %error, "failed writing notification");
        }
    }

    pub fn error(&self, err: &mut dyn Write, message: &str) {
        debug!(message, "notify error");
        if let Err(error) = self.write_error(err, message) {
            debug!(error = %error, "failed writing notification");
        }
    }

    fn write_success<W: Write>(&self, mut out: W, message: &str) -> io::Result<()> {
        writeln!(out, "{}", self.paint(message, "32"))
    }

    fn write_error<W: Write>(&self, mut out: W, message: &str) -> io::Result<()> {
        writeln!(out, "{}", self.paint(message, "31"))
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

#[cfg(test)]
mod tests {
    use super::Notifier;

    #[test]
    fn plain_messages_have_no_escapes() {
        let notifier = Notifier { color: false };
        let mut out = Vec::new();
        notifier
            .write_error(&mut out, "Failed to load events")
            .expect("write");
        assert_eq!(out, b"Failed to load events\n");
    }

    #[test]
    fn error_lands_on_the_given_stream() {
        let notifier = Notifier { color: false };
        let mut err = Vec::new();
        notifier.error(&mut err, "Logout failed");
        notifier.success(&mut err, "Logged out");
        assert_eq!(
            String::from_utf8(err).expect("utf8"),
            "Logout failed\nLogged out\n"
        );
    }

    #[test]
    fn closed_stream_is_not_fatal() {
        struct Closed;
        impl std::io::Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        Notifier { color: false }.error(&mut Closed, "Failed to load events");
    }

    #[test]
    fn colored_success_is_green() {
        let notifier = Notifier { color: true };
        let mut out = Vec::new();
        notifier.write_success(&mut out, "RSVP saved").expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "\x1b[32mRSVP saved\x1b[0m\n"
        );
    }
}
