//! Compact log line format: a coloured level tag followed by the message

use owo_colors::OwoColorize as _;
use std::fmt;
use tracing_core::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

pub struct TagFormatter;

impl<S, N> FormatEvent<S, N> for TagFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        let tag = level_tag(level);

        if writer.has_ansi_escapes() {
            if level == Level::ERROR {
                write!(writer, "{} ", tag.red().bold())?;
            } else if level == Level::WARN {
                write!(writer, "{} ", tag.yellow().bold())?;
            } else if level == Level::INFO {
                write!(writer, "{} ", tag.blue().bold())?;
            } else {
                write!(writer, "{} ", tag.dimmed())?;
            }
        } else {
            write!(writer, "{} ", tag)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_tag(level: Level) -> &'static str {
    if level == Level::ERROR {
        "Error:"
    } else if level == Level::WARN {
        "Warning:"
    } else if level == Level::INFO {
        "Info:"
    } else if level == Level::DEBUG {
        "Debug:"
    } else {
        "Trace:"
    }
}
