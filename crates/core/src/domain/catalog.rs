use serde::Serialize;
use utoipa::ToSchema;

use crate::error::CoreError;

pub const PHASE_COUNT: i64 = 18;

const PHASE_NAMES: [&str; PHASE_COUNT as usize] = [
    "Phase 0: Document Analysis",
    "Phase 1: Activity Identification",
    "Phase 2: Environmental Analysis",
    "Phase 3: Social Analysis",
    "Phase 4: Governance Analysis",
    "Phase 5: Social Impact Analysis",
    "Phase 6: Governance Analysis",
    "Phase 7: Case Overview",
    "Phase 8: Case Requirements",
    "Phase 9: Case Gap Analysis",
    "Phase 10: Case Impact Assessment",
    "Phase 11: Case Recommendations",
    "Phase 12: Case Implementation Plan",
    "Phase 13: Development Strategy",
    "Phase 14: Resource Allocation",
    "Phase 15: Timeline Planning",
    "Phase 16: Implementation Roadmap",
    "Phase 17: Progress Monitoring",
];

const PHASE_DESCRIPTIONS: [&str; PHASE_COUNT as usize] = [
    "Reviews all uploaded documents to understand business context and key information",
    "Identifies key business activities and categories from document analysis",
    "Analyzes environmental impact categories and their relationship to business activities",
    "Analyzes social impact categories and their relationship to business activities",
    "Analyzes governance aspects and their relationship to business activities",
    "Detailed analysis of social impacts and strategies",
    "Detailed analysis of governance structure and effectiveness",
    "Overview of the specific case and context",
    "Detailed requirements for the specific case",
    "Gap analysis specific to the case context",
    "Assessment of potential impacts in the case",
    "Specific recommendations for the case",
    "Detailed implementation plan for case solutions",
    "Overall development strategy and approach",
    "Planning and allocation of resources",
    "Detailed timeline for implementation",
    "Comprehensive implementation roadmap",
    "Progress monitoring and tracking framework",
];

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum PhaseCategory {
    #[serde(rename = "Initial Analytics")]
    InitialAnalytics,
    #[serde(rename = "ESG Analysis")]
    EsgAnalysis,
    #[serde(rename = "Case Specific Analysis")]
    CaseSpecificAnalysis,
    #[serde(rename = "Development Plan")]
    DevelopmentPlan,
}

impl PhaseCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialAnalytics => "Initial Analytics",
            Self::EsgAnalysis => "ESG Analysis",
            Self::CaseSpecificAnalysis => "Case Specific Analysis",
            Self::DevelopmentPlan => "Development Plan",
        }
    }

    pub fn for_phase(phase_number: i64) -> Option<Self> {
        match phase_number {
            0..=4 => Some(Self::InitialAnalytics),
            5..=6 => Some(Self::EsgAnalysis),
            7..=12 => Some(Self::CaseSpecificAnalysis),
            13..=17 => Some(Self::DevelopmentPlan),
            _ => None,
        }
    }
}

/// Display information for one numbered phase.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PhaseInfo {
    pub phase_number: i64,
    pub name: &'static str,
    pub description: &'static str,
    pub category: PhaseCategory,
}

pub fn phase_info(phase_number: i64) -> Result<PhaseInfo, CoreError> {
    let category =
        PhaseCategory::for_phase(phase_number).ok_or(CoreError::UnknownPhase(phase_number))?;
    let idx = phase_number as usize;
    Ok(PhaseInfo {
        phase_number,
        name: PHASE_NAMES[idx],
        description: PHASE_DESCRIPTIONS[idx],
        category,
    })
}

pub fn phase_catalog() -> Vec<PhaseInfo> {
    (0..PHASE_COUNT).filter_map(|n| phase_info(n).ok()).collect()
}
