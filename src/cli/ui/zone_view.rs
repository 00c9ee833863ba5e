use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::cli::offline::update_reports;
use crate::cli::status::StatusReport;
use crate::cli::watch::{WatchStopReason, WatchSummary};
use crate::decode::{DecodedFrame, FrameDecodeError};
use crate::engine::ZoneChange;
use crate::protocol::{Attribute, ProtocolFamily};
use crate::state::ZoneSnapshot;
use crate::utils::{format_hex, format_optional};

use super::painter::Painter;
use super::table::Table;

/// Renders the zone table printed by `status`.
pub(crate) struct StatusView<'a> {
    report: &'a StatusReport,
    painter: &'a Painter,
}

impl<'a> StatusView<'a> {
    pub(crate) fn new(report: &'a StatusReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn row(&self, zone: &ZoneSnapshot) -> Vec<String> {
        let mut row = vec![
            zone.zone.to_string(),
            zone.name.clone().unwrap_or_default(),
            self.painter.switch(zone.power),
        ];
        if self.report.family == ProtocolFamily::Audio {
            row.push(self.painter.switch(zone.mute));
        }
        row.push(zone.level.to_string());
        if self.report.family == ProtocolFamily::Audio {
            row.extend([
                format_optional(zone.source),
                format_optional(zone.bass),
                format_optional(zone.treble),
                format_optional(zone.balance),
            ]);
        }
        row.push(match zone.age_secs {
            Some(secs) => humantime::format_duration(Duration::from_secs(secs)).to_string(),
            None => self.painter.muted("never"),
        });
        row
    }
}

impl Display for StatusView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (headers, numeric): (&[&str], &[usize]) = match self.report.family {
            ProtocolFamily::Lighting => (&["zone", "name", "power", "level", "age"], &[0, 3]),
            ProtocolFamily::Audio => (
                &[
                    "zone", "name", "power", "mute", "level", "source", "bass", "treble",
                    "balance", "age",
                ],
                &[0, 4, 5, 6, 7, 8],
            ),
        };
        let rows = self
            .report
            .zones
            .iter()
            .map(|zone| self.row(zone))
            .collect();
        let table = Table::grid(headers.iter().copied(), rows).align_right(numeric.iter().copied());

        write!(
            f,
            "{} {}",
            self.painter
                .heading(format!("Zones ({}):", self.report.family.metadata().name())),
            ReadinessView::new(self.report.ready, self.painter)
        )?;
        write!(f, "\n{table}")
    }
}

/// Renders whether every zone has reported recently.
pub(crate) struct ReadinessView<'a> {
    ready: bool,
    painter: &'a Painter,
}

impl<'a> ReadinessView<'a> {
    pub(crate) fn new(ready: bool, painter: &'a Painter) -> Self {
        Self { ready, painter }
    }
}

impl Display for ReadinessView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.ready {
            write!(f, "{}", self.painter.success("ready"))
        } else {
            write!(f, "{}", self.painter.warning("not ready"))
        }
    }
}

/// Renders one zone change line for `watch`.
pub(crate) struct WatchChangeView<'a> {
    index: usize,
    change: &'a ZoneChange,
    name: Option<&'a str>,
    painter: &'a Painter,
}

impl<'a> WatchChangeView<'a> {
    pub(crate) fn new(
        index: usize,
        change: &'a ZoneChange,
        name: Option<&'a str>,
        painter: &'a Painter,
    ) -> Self {
        Self {
            index,
            change,
            name,
            painter,
        }
    }
}

impl Display for WatchChangeView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self.painter.muted(format!("[{:04}]", self.index));
        let value = match self.change.attribute {
            Attribute::Power | Attribute::Mute => self.painter.switch(Some(self.change.value != 0)),
            _ => self.painter.value(self.change.value.to_string()),
        };
        write!(f, "{index_label} zone {}", self.change.zone)?;
        if let Some(name) = self.name {
            write!(f, " {}", self.painter.muted(format!("({name})")))?;
        }
        write!(f, " {} = {value}", self.change.attribute)
    }
}

/// Renders the `watch` session summary.
pub(crate) struct WatchSummaryView<'a> {
    summary: &'a WatchSummary,
    painter: &'a Painter,
}

impl<'a> WatchSummaryView<'a> {
    pub(crate) fn new(summary: &'a WatchSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for WatchSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = self.summary.stop_reason();
        let stop_reason = match reason {
            WatchStopReason::ReachedLimit(_) | WatchStopReason::Elapsed => {
                self.painter.success(reason.to_string())
            }
            WatchStopReason::Interrupted | WatchStopReason::ChangeStreamClosed => {
                self.painter.warning(reason.to_string())
            }
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Stopped:"),
            stop_reason,
            self.painter.value(format!(
                "- received {} change(s)",
                self.summary.received_changes()
            ))
        )
    }
}

/// Renders one frame passed to `decode`.
pub(crate) struct DecodedFrameView<'a> {
    family: ProtocolFamily,
    frame: &'a str,
    result: &'a Result<DecodedFrame, FrameDecodeError>,
    painter: &'a Painter,
}

impl<'a> DecodedFrameView<'a> {
    pub(crate) fn new(
        family: ProtocolFamily,
        frame: &'a str,
        result: &'a Result<DecodedFrame, FrameDecodeError>,
        painter: &'a Painter,
    ) -> Self {
        Self {
            family,
            frame,
            result,
            painter,
        }
    }

    fn frame_bytes(&self) -> Option<String> {
        if self.family != ProtocolFamily::Lighting {
            return None;
        }
        let hex_text = self.frame.strip_prefix('\\')?;
        hex::decode(hex_text).ok().map(|bytes| format_hex(&bytes))
    }
}

impl Display for DecodedFrameView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.painter.heading("Frame:"),
            self.painter.value(self.frame)
        )?;
        let decoded = match self.result {
            Ok(decoded) => decoded,
            Err(error) => {
                return write!(f, "\n{}", self.painter.error(error.to_string()));
            }
        };

        let mut fields = vec![("kind", decoded.kind.to_string())];
        if let Some(bytes) = self.frame_bytes() {
            fields.push(("bytes", bytes));
        }
        if !decoded.touched.is_empty() {
            let touched: Vec<String> = decoded.touched.iter().map(ToString::to_string).collect();
            fields.push(("zones", touched.join(", ")));
        }
        write!(f, "\n{}", Table::key_value(self.painter, fields))?;

        let updates = update_reports(self.family, decoded);
        if updates.is_empty() {
            return write!(f, "\n{}", self.painter.muted("no zone updates"));
        }
        let rows = updates
            .iter()
            .map(|update| {
                vec![
                    update.zone.to_string(),
                    update.attribute.to_string(),
                    update.native.to_string(),
                    update.value.to_string(),
                ]
            })
            .collect();
        let table =
            Table::grid(["zone", "attribute", "native", "value"], rows).align_right([0, 2, 3]);
        write!(f, "\n{table}")
    }
}

/// Renders the frames produced by `encode`.
pub(crate) struct EncodedFramesView<'a> {
    frames: &'a [String],
    painter: &'a Painter,
}

impl<'a> EncodedFramesView<'a> {
    pub(crate) fn new(frames: &'a [String], painter: &'a Painter) -> Self {
        Self { frames, painter }
    }
}

impl Display for EncodedFramesView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return write!(f, "{}", self.painter.muted("no frames"));
        }
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "{} {}",
                self.painter.muted(format!("[{}]", index + 1)),
                self.painter.value(frame)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::decode::FrameDecoder;

    fn snapshot(zone: u16, level: u8) -> ZoneSnapshot {
        ZoneSnapshot {
            zone,
            name: (zone == 1).then(|| "Kitchen".to_string()),
            power: Some(level > 0),
            mute: Some(false),
            level,
            source: Some(2),
            bass: Some(50),
            treble: Some(50),
            balance: Some(50),
            age_secs: Some(90),
        }
    }

    #[test]
    fn audio_status_renders_every_column() {
        let report = StatusReport {
            family: ProtocolFamily::Audio,
            ready: true,
            zones: vec![snapshot(1, 21), snapshot(2, 0)],
        };
        let painter = Painter::new(false);
        assert_snapshot!(StatusView::new(&report, &painter).to_string(), @r"
        Zones (audio matrix): ready
        ╭──────┬─────────┬───────┬──────┬───────┬────────┬──────┬────────┬─────────┬────────╮
        │ zone │ name    │ power │ mute │ level │ source │ bass │ treble │ balance │ age    │
        ├──────┼─────────┼───────┼──────┼───────┼────────┼──────┼────────┼─────────┼────────┤
        │    1 │ Kitchen │ on    │ off  │    21 │      2 │   50 │     50 │      50 │ 1m 30s │
        │    2 │         │ off   │ off  │     0 │      2 │   50 │     50 │      50 │ 1m 30s │
        ╰──────┴─────────┴───────┴──────┴───────┴────────┴──────┴────────┴─────────┴────────╯
        ");
    }

    #[test]
    fn lighting_status_omits_audio_columns() {
        let mut zone = snapshot(37, 100);
        zone.age_secs = None;
        let report = StatusReport {
            family: ProtocolFamily::Lighting,
            ready: false,
            zones: vec![zone],
        };
        let painter = Painter::new(false);
        let rendered = StatusView::new(&report, &painter).to_string();
        assert!(rendered.starts_with("Zones (lighting bus): not ready"));
        assert!(rendered.contains("│ zone │ name │ power │ level │ age   │"));
        assert!(rendered.contains("never"));
        assert!(!rendered.contains("treble"));
    }

    #[rstest]
    #[case(Attribute::Level, 50, Some("Kitchen"), "[0007] zone 1 (Kitchen) level = 50")]
    #[case(Attribute::Power, 1, None, "[0007] zone 1 power = on")]
    #[case(Attribute::Mute, 0, None, "[0007] zone 1 mute = off")]
    fn change_line_names_zone_and_attribute(
        #[case] attribute: Attribute,
        #[case] value: u8,
        #[case] name: Option<&str>,
        #[case] expected: &str,
    ) {
        let change = ZoneChange {
            attribute,
            zone: 1,
            value,
        };
        let painter = Painter::new(false);
        assert_eq!(
            expected,
            WatchChangeView::new(7, &change, name, &painter).to_string()
        );
    }

    #[rstest]
    #[case(
        WatchStopReason::ReachedLimit(3),
        "Stopped: reached limit of 3 change(s) - received 3 change(s)"
    )]
    #[case(WatchStopReason::Interrupted, "Stopped: interrupted - received 3 change(s)")]
    fn summary_renders_stop_reason(#[case] reason: WatchStopReason, #[case] expected: &str) {
        let summary = WatchSummary::new(3, reason);
        let painter = Painter::new(false);
        assert_eq!(
            expected,
            WatchSummaryView::new(&summary, &painter).to_string()
        );
    }

    #[test]
    fn decoded_lighting_frame_shows_bytes_and_updates() {
        let frame = "\\051238007925000103000F";
        let result = FrameDecoder::new(ProtocolFamily::Lighting).decode(frame);
        let painter = Painter::new(false);
        let rendered = DecodedFrameView::new(ProtocolFamily::Lighting, frame, &result, &painter)
            .to_string();
        assert!(rendered.starts_with("Frame: \\051238007925000103000F"));
        assert!(rendered.contains("point-to-multipoint"));
        assert!(rendered.contains("05 12 38 00 79 25 00 01 03 00 0F"));
        assert!(rendered.contains("│   37 │ level     │    255 │   100 │"));
    }

    #[test]
    fn decode_failure_is_rendered_inline() {
        let result = FrameDecoder::new(ProtocolFamily::Audio).decode("X1ZS+");
        let painter = Painter::new(false);
        assert_snapshot!(
            DecodedFrameView::new(ProtocolFamily::Audio, "X1ZS+", &result, &painter).to_string(),
            @r"
        Frame: X1ZS+
        unrecognised leading character `X`
        "
        );
    }

    #[test]
    fn encoded_frames_are_numbered() {
        let frames = vec!["!1PR1+".to_string(), "!2PR1+".to_string()];
        let painter = Painter::new(false);
        assert_snapshot!(EncodedFramesView::new(&frames, &painter).to_string(), @r"
        [1] !1PR1+
        [2] !2PR1+
        ");
    }
}
