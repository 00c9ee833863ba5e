mod painter;
mod progress;
mod table;
mod zone_view;

pub(crate) use self::painter::Painter;
pub(crate) use self::progress::ReportProgress;
pub(crate) use self::zone_view::{
    DecodedFrameView, EncodedFramesView, ReadinessView, StatusView, WatchChangeView,
    WatchSummaryView,
};
