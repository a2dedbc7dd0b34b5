//! Maps a query window onto retention tiers and their physical partitions.

use std::fmt::{Display, Formatter};

const DAY: i64 = 24 * 60 * 60;

/// A retention resolution. Coarser tiers cover longer windows with a larger
/// step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// 1 minute points, day-wide tables split into hour-wide items.
    Hourly,
    /// 5 minute points, one item per day-wide table.
    Daily,
    /// 1 hour points, one item per week-wide table.
    Weekly,
    /// 1 day points, one item per 360 day table.
    Yearly,
}

impl Tier {
    /// Every tier, finest first. Writes go to all of them.
    pub const ALL: [Tier; 4] = [Tier::Hourly, Tier::Daily, Tier::Weekly, Tier::Yearly];

    /// Picks the tier for a window of `end - start` seconds.
    pub fn for_range(start: i64, end: i64) -> Tier {
        let diff = end.saturating_sub(start);
        if diff >= 360 * DAY {
            Tier::Yearly
        } else if diff >= 7 * DAY {
            Tier::Weekly
        } else if diff >= DAY {
            Tier::Daily
        } else {
            Tier::Hourly
        }
    }

    pub fn step(&self) -> i64 {
        match self {
            Tier::Hourly => 60,
            Tier::Daily => 5 * 60,
            Tier::Weekly => 60 * 60,
            Tier::Yearly => DAY,
        }
    }

    pub fn table_width(&self) -> i64 {
        match self {
            Tier::Hourly | Tier::Daily => DAY,
            Tier::Weekly => 7 * DAY,
            Tier::Yearly => 360 * DAY,
        }
    }

    pub fn item_width(&self) -> i64 {
        match self {
            Tier::Hourly => 60 * 60,
            _ => self.table_width(),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Tier::Hourly => "1m1h",
            Tier::Daily => "5m1d",
            Tier::Weekly => "1h7d",
            Tier::Yearly => "1d1y",
        }
    }

    pub fn table_epoch(&self, ts: i64) -> i64 {
        floor_to(ts, self.table_width())
    }

    pub fn item_epoch(&self, ts: i64) -> i64 {
        floor_to(ts, self.item_width())
    }

    /// `"<prefix>-<suffix>-<tableEpoch>"`
    pub fn table_name(&self, prefix: &str, table_epoch: i64) -> String {
        format!("{}-{}-{}", prefix, self.suffix(), table_epoch)
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Rounds `ts` down to a multiple of `width`, saturating at `i64::MIN`.
pub(crate) fn floor_to(ts: i64, width: i64) -> i64 {
    ts.saturating_sub(ts.rem_euclid(width))
}

/// Upper bound on the partitions a single window may touch.
pub const MAX_PARTITIONS: i128 = 1_000;

/// A query window that cannot be mapped onto partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The window spans more than [`MAX_PARTITIONS`] partitions.
    TooLarge { partitions: i128 },
    /// A partition boundary falls outside the `i64` range.
    OutOfRange,
}

impl std::error::Error for WindowError {}

impl Display for WindowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowError::TooLarge { partitions } => write!(
                f,
                "time range spans {} partitions, the limit is {}",
                partitions, MAX_PARTITIONS
            ),
            WindowError::OutOfRange => f.write_str("time range is out of bounds"),
        }
    }
}

/// One physical bucket: a table of some tier plus an item epoch inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub table: String,
    pub item_epoch: i64,
}

impl Partition {
    pub fn new(table: impl Into<String>, item_epoch: i64) -> Self {
        Self {
            table: table.into(),
            item_epoch,
        }
    }
}

/// Returns the partitions covering `[start, end)` and the step of the chosen
/// tier, ordered by table epoch and then item epoch.
///
/// Item widths divide table widths, so walking item epochs in order visits
/// tables in order too.
pub fn select(
    start: i64,
    end: i64,
    table_prefix: &str,
) -> Result<(Vec<Partition>, i64), WindowError> {
    let tier = Tier::for_range(start, end);
    let Some((first, count)) = item_span(tier, start, end)? else {
        return Ok((Vec::new(), tier.step()));
    };

    let item_width = i128::from(tier.item_width());
    let table_width = i128::from(tier.table_width());
    let mut partitions = Vec::with_capacity(count);
    let mut item = first;
    while item < i128::from(end) {
        let table_epoch = i64::try_from(item - item.rem_euclid(table_width))
            .map_err(|_| WindowError::OutOfRange)?;
        let item_epoch = i64::try_from(item).map_err(|_| WindowError::OutOfRange)?;
        partitions.push(Partition::new(
            tier.table_name(table_prefix, table_epoch),
            item_epoch,
        ));
        item += item_width;
    }

    Ok((partitions, tier.step()))
}

/// Checks that `[start, end)` can be served without building the partitions.
pub fn check_window(start: i64, end: i64) -> Result<(), WindowError> {
    item_span(Tier::for_range(start, end), start, end).map(|_| ())
}

/// First item epoch and item count of a non-empty window, widened so that
/// the arithmetic cannot overflow.
fn item_span(tier: Tier, start: i64, end: i64) -> Result<Option<(i128, usize)>, WindowError> {
    if end <= start {
        return Ok(None);
    }
    let item_width = i128::from(tier.item_width());
    let first = i128::from(start) - i128::from(start).rem_euclid(item_width);
    let count = (i128::from(end) - first + item_width - 1) / item_width;
    if count > MAX_PARTITIONS {
        return Err(WindowError::TooLarge { partitions: count });
    }
    if first < i128::from(i64::MIN) {
        return Err(WindowError::OutOfRange);
    }
    usize::try_from(count)
        .map(|count| Some((first, count)))
        .map_err(|_| WindowError::OutOfRange)
}
