use std::fmt;

use time::{macros::format_description, Time};

use crate::{Category, Event};

/// Controls how an event is formatted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayFormat {
    /// Time of day prefixed to the line, if any.
    pub time: Option<Time>,
}

impl DisplayFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix the output with the given time of day.
    pub fn time(mut self, time: Time) -> Self {
        self.time = Some(time);
        self
    }
}

/// Trait controlling how an event is displayed. It works by providing an
/// helper returning an implementation of the std::fmt::Display trait, which
/// can take a format as argument unlike a plain std::fmt::Display
/// implementation.
pub trait EventDisplay<'a>: EventFmt {
    fn display(&'a self, format: &'a DisplayFormat) -> Box<dyn fmt::Display + 'a>;
}

/// Trait controlling how an event is formatted.
pub trait EventFmt {
    fn event_fmt(&self, f: &mut fmt::Formatter, format: &DisplayFormat) -> fmt::Result;
}

impl<'a, T> EventDisplay<'a> for T
where
    T: EventFmt,
{
    fn display(&'a self, format: &'a DisplayFormat) -> Box<dyn fmt::Display + 'a> {
        struct DefaultDisplay<'a, U> {
            myself: &'a U,
            format: &'a DisplayFormat,
        }
        impl<U: EventFmt> fmt::Display for DefaultDisplay<'_, U> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                self.myself.event_fmt(f, self.format)
            }
        }
        Box::new(DefaultDisplay {
            myself: self,
            format,
        })
    }
}

impl EventFmt for Event {
    fn event_fmt(&self, f: &mut fmt::Formatter, format: &DisplayFormat) -> fmt::Result {
        if let Some(time) = format.time {
            let ts = time
                .format(format_description!("[hour]:[minute]:[second]"))
                .map_err(|_| fmt::Error)?;
            write!(f, "{ts} ")?;
        }

        match self.category {
            // Commands are echoed before being acted upon, their message is
            // not meaningful.
            Category::Command => write!(f, "COMMAND  pid:{} code:{}", self.pid, self.code),
            _ => write!(
                f,
                "{}  pid:{} code:{}, msg:{}",
                self.category, self.pid, self.code, self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::time;

    use super::*;

    #[test]
    fn display_info() {
        let event = Event::new(Category::Info, 1, 0, "x");
        let format = DisplayFormat::new();
        assert_eq!(
            format!("{}", event.display(&format)),
            "INFO  pid:1 code:0, msg:x"
        );

        let format = DisplayFormat::new().time(time!(09:05:03));
        assert_eq!(
            format!("{}", event.display(&format)),
            "09:05:03 INFO  pid:1 code:0, msg:x"
        );
    }

    #[test]
    fn display_command() {
        let event = Event::new(Category::Command, 12, 2, "ignored");
        assert_eq!(
            format!("{}", event.display(&DisplayFormat::new())),
            "COMMAND  pid:12 code:2"
        );
    }

    #[test]
    fn display_unknown() {
        let event = Event::new(Category::Unknown(9), 3, -1, "bad");
        assert_eq!(
            format!("{}", event.display(&DisplayFormat::new())),
            "UNKNOWN(9)  pid:3 code:-1, msg:bad"
        );
    }
}
