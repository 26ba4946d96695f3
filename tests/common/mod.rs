#![allow(dead_code)]

use p1_reader::p1::port::{LinePort, PortError, READ_TIMEOUT};
use p1_reader::prelude::*;
use std::collections::VecDeque;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub enum Step {
    Line(Vec<u8>),
    Fail(PortError),
    /// An error outside the port's own taxonomy.
    Unexpected(&'static str),
}

/// A fake serial port that plays back a script of lines and failures. Once
/// the script runs out every read times out, like a silent meter.
#[derive(Default)]
pub struct ScriptedPort {
    steps: VecDeque<Step>,
    open: bool,
    pub opens: usize,
    pub closes: usize,
    pub lines_read: usize,
    pub fail_open: bool,
    pub fail_close: bool,
}

impl ScriptedPort {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            ..Default::default()
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Default::default()
        }
    }

    pub fn push(&mut self, steps: Vec<Step>) {
        self.steps.extend(steps);
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl LinePort for ScriptedPort {
    fn open(&mut self) -> Result<()> {
        self.opens += 1;
        if self.fail_open {
            return Err(PortError::Open {
                path: "/dev/ttyFAKE".to_string(),
                reason: "No such file or directory".to_string(),
            }
            .into());
        }
        self.open = true;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        if !self.open {
            return Err(PortError::NotOpen.into());
        }
        self.lines_read += 1;

        match self.steps.pop_front() {
            Some(Step::Line(line)) => Ok(line),
            Some(Step::Fail(err)) => Err(err.into()),
            Some(Step::Unexpected(message)) => Err(anyhow!(message)),
            None => Err(PortError::Timeout(READ_TIMEOUT).into()),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        let was_open = std::mem::replace(&mut self.open, false);
        if self.fail_close && was_open {
            return Err(PortError::Close {
                path: "/dev/ttyFAKE".to_string(),
                reason: "Input/output error".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

pub struct Factory;

impl Factory {
    pub fn line(s: &str) -> Step {
        Step::Line(format!("{}\r\n", s).into_bytes())
    }

    /// Lines of a DSMR 5 telegram, minus the two power registers.
    pub fn header() -> Vec<Step> {
        [
            "/Ene5\\T210-D ESMR5.0",
            "",
            "1-3:0.2.8(50)",
            "0-0:1.0.0(240601120000S)",
            "0-0:96.1.1(4530303434303037313331363530363138)",
            "1-0:1.8.1(004512.387*kWh)",
            "1-0:1.8.2(003981.020*kWh)",
            "1-0:2.8.1(001203.551*kWh)",
            "1-0:2.8.2(002710.004*kWh)",
            "0-0:96.14.0(0002)",
        ]
        .iter()
        .map(|s| Self::line(s))
        .collect()
    }

    pub fn footer() -> Vec<Step> {
        [
            "0-0:96.7.21(00012)",
            "0-0:96.7.9(00004)",
            "1-0:32.32.0(00003)",
            "1-0:32.7.0(231.4*V)",
            "1-0:31.7.0(005*A)",
            "1-0:21.7.0(01.193*kW)",
            "1-0:22.7.0(00.000*kW)",
            "!6F4A",
        ]
        .iter()
        .map(|s| Self::line(s))
        .collect()
    }

    pub fn delivered(value: &str) -> Step {
        Self::line(&format!("1-0:1.7.0({}*kW)", value))
    }

    pub fn returned(value: &str) -> Step {
        Self::line(&format!("1-0:2.7.0({}*kW)", value))
    }

    pub fn telegram(delivered: &str, returned: &str) -> Vec<Step> {
        let mut steps = Self::header();
        steps.push(Self::delivered(delivered));
        steps.push(Self::returned(returned));
        steps.extend(Self::footer());
        steps
    }

    pub fn noise(count: usize) -> Vec<Step> {
        (0..count)
            .map(|i| Self::line(&format!("0-0:96.13.{}()", i)))
            .collect()
    }

    pub fn event_log() -> (tempfile::TempDir, EventLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let log = EventLog::new(path.to_str().unwrap()).unwrap();
        (dir, log)
    }
}
