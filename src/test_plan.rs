//! Ramp stages and the test plan built from them.
//!
//! A load test is a series of stages. Each stage lasts a fixed amount of time, during
//! which the number of running virtual users moves linearly from the previous stage's
//! target toward this stage's target.

use chrono::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::util;
use crate::LoadTestError;

/// How many users are running when the first stage begins.
pub const DEFAULT_START_USERS: usize = 1;

/// One time-boxed segment of the ramp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// How long the stage lasts.
    pub duration: Duration,
    /// How many concurrent users should be running when the stage ends.
    pub target: usize,
}
impl Stage {
    /// Create a stage lasting `seconds` that ramps toward `target` users.
    pub fn new(seconds: u64, target: usize) -> Self {
        Stage {
            duration: Duration::from_secs(seconds),
            target,
        }
    }
}

/// An ordered sequence of [`Stage`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestPlan {
    /// Users running before the first stage starts ramping.
    pub start_users: usize,
    /// The stages, executed in order.
    pub stages: Vec<Stage>,
}
impl Default for TestPlan {
    fn default() -> Self {
        TestPlan::new(Vec::new())
    }
}

impl TestPlan {
    /// Build a test plan from stages, starting from [`DEFAULT_START_USERS`].
    pub fn new(stages: Vec<Stage>) -> TestPlan {
        TestPlan {
            start_users: DEFAULT_START_USERS,
            stages,
        }
    }

    /// Override how many users are running when the first stage begins.
    pub fn with_start_users(mut self, start_users: usize) -> Self {
        self.start_users = start_users;
        self
    }

    /// Total time covered by all stages.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    /// The largest number of users the plan will ever ask for.
    pub fn max_users(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| stage.target)
            .fold(self.start_users, usize::max)
    }

    /// Which stage is active after `elapsed` time, or `None` once the plan is complete.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(index);
            }
        }
        None
    }

    /// How many users should be running after `elapsed` time.
    ///
    /// Within a stage the count is interpolated linearly between the previous target and
    /// the stage target, rounded to the nearest user. Once every stage has completed the
    /// final target is held.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut from = self.start_users as f64;
        let mut stage_start = Duration::ZERO;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                // elapsed >= stage_start, so this stage has a non-zero duration.
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return (from + (stage.target as f64 - from) * progress).round() as usize;
            }
            from = stage.target as f64;
            stage_start = stage_end;
        }
        from as usize
    }

    /// Describe what happens during a stage, for the stage history.
    pub(crate) fn stage_action(&self, index: usize) -> StageAction {
        let from = if index == 0 {
            self.start_users
        } else {
            self.stages[index - 1].target
        };
        match self.stages.get(index) {
            Some(stage) if stage.target > from => StageAction::Increasing,
            Some(stage) if stage.target < from => StageAction::Decreasing,
            Some(_) => StageAction::Maintaining,
            None => StageAction::Finished,
        }
    }
}

/// Implement [`FromStr`] to convert `"users,timespan"` formatted stages, separated by
/// semicolons, to a [`TestPlan`].
///
/// Users are represented simply as an integer.
///
/// Time span can be specified as an integer, indicating seconds. Or can use integers together
/// with one or more of "h", "m", and "s", in that order, indicating "hours", "minutes", and
/// "seconds". Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use std::str::FromStr;
/// use timeapi_loadtest::test_plan::{Stage, TestPlan};
///
/// let plan = TestPlan::from_str("10,60s;160,60s;300,2m").unwrap();
/// assert_eq!(
///     plan.stages,
///     vec![Stage::new(60, 10), Stage::new(60, 160), Stage::new(120, 300)]
/// );
/// ```
impl FromStr for TestPlan {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^\s*(\d+)\s*,\s*(\d+|((\d+?)h)?((\d+?)m)?((\d+?)s)?)\s*$")
            .expect("failed to compile stage regex");
        let mut stages = Vec::new();
        for line in s.split(';') {
            let captures = re.captures(line).ok_or_else(|| LoadTestError::InvalidOption {
                option: "--stages".to_string(),
                value: line.to_string(),
                detail: "expected \"{users},{timespan};{users},{timespan}\", for example \"10,60s;160,1m\"".to_string(),
            })?;
            let target = captures[1]
                .parse::<usize>()
                .map_err(|e| LoadTestError::InvalidOption {
                    option: "--stages".to_string(),
                    value: line.to_string(),
                    detail: format!("invalid user count: {}", e),
                })?;
            let seconds = util::parse_timespan(&captures[2]);
            stages.push(Stage::new(seconds as u64, target));
        }
        Ok(TestPlan::new(stages))
    }
}

impl fmt::Display for TestPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let stages: Vec<String> = self
            .stages
            .iter()
            .map(|stage| {
                format!(
                    "{},{}",
                    stage.target,
                    util::format_timespan(stage.duration.as_secs() as usize)
                )
            })
            .collect();
        write!(f, "{}", stages.join(";"))
    }
}

/// What the runtime is doing with users during a stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum StageAction {
    /// Users are being added.
    Increasing,
    /// The number of users is held steady.
    Maintaining,
    /// Users are being retired.
    Decreasing,
    /// All stages completed and users are stopping.
    Finished,
}

/// A historical record of a stage starting, used in reports.
#[derive(Clone, Debug, Serialize)]
pub struct StageHistory {
    /// Index of the stage in the test plan.
    pub stage: usize,
    /// What happens during this stage.
    pub action: StageAction,
    /// When the stage started.
    pub timestamp: DateTime<Local>,
    /// How many users were running when the stage started.
    pub users: usize,
}
impl StageHistory {
    pub(crate) fn step(stage: usize, action: StageAction, users: usize) -> StageHistory {
        StageHistory {
            stage,
            action,
            timestamp: Local::now(),
            users,
        }
    }
}
