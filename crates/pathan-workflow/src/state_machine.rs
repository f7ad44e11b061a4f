//! 分析会话状态机
//!
//! 管理一次分析从上传到完成的生命周期状态转换

use pathan_core::{PathanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Empty,
    AwaitingUpload,
    ReadyToRun,
    Running,
    Completed,
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnalysisEvent {
    SessionStarted,
    ImageAccepted,
    /// 表单已填写完整（姓名非空）
    FormCompleted,
    FormIncomplete,
    RunRequested,
    GenerationSucceeded,
    GenerationFailed,
    /// 已完成状态下上传新图像
    ImageReplaced,
    Reset,
}

/// 分析状态机
///
/// 条件转换（例如“有图像且姓名非空才可运行”）由会话在事件之后
/// 补发 `FormCompleted` / `FormIncomplete` 完成。
#[derive(Debug)]
pub struct AnalysisStateMachine {
    transitions: HashMap<(AnalysisState, AnalysisEvent), AnalysisState>,
}

impl AnalysisStateMachine {
    pub fn new() -> Self {
        use AnalysisEvent::*;
        use AnalysisState::*;

        let mut transitions = HashMap::new();

        transitions.insert((Empty, SessionStarted), AwaitingUpload);

        transitions.insert((AwaitingUpload, ImageAccepted), AwaitingUpload);
        transitions.insert((AwaitingUpload, FormCompleted), ReadyToRun);
        transitions.insert((AwaitingUpload, FormIncomplete), AwaitingUpload);

        transitions.insert((ReadyToRun, ImageAccepted), ReadyToRun);
        transitions.insert((ReadyToRun, FormCompleted), ReadyToRun);
        transitions.insert((ReadyToRun, FormIncomplete), AwaitingUpload);
        transitions.insert((ReadyToRun, RunRequested), Running);

        transitions.insert((Running, GenerationSucceeded), Completed);
        transitions.insert((Running, GenerationFailed), ReadyToRun);

        // 已完成后修改表单不影响已有结果
        transitions.insert((Completed, FormCompleted), Completed);
        transitions.insert((Completed, FormIncomplete), Completed);
        transitions.insert((Completed, ImageReplaced), Empty);

        for state in [Empty, AwaitingUpload, ReadyToRun, Completed] {
            transitions.insert((state, Reset), Empty);
        }

        Self { transitions }
    }

    pub fn can_transition(&self, from: AnalysisState, event: AnalysisEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: AnalysisState, event: AnalysisEvent) -> Result<AnalysisState> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(PathanError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 当前状态下允许的事件
    pub fn possible_events(&self, current: AnalysisState) -> Vec<AnalysisEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for AnalysisStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
