//! Typed identifiers of linear problem variables and constraints.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariationDirection {
    Upward,
    Downward,
}

/// Sign of an absolute-value linearisation constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbsExtension {
    Positive,
    Negative,
}

/// Side of a CNEC a margin constraint is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarginExtension {
    BelowThreshold,
    AboveThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKey {
    Flow { cnec: String },
    Setpoint { range_action: String },
    AbsoluteVariation { range_action: String },
    PstTapVariation { range_action: String, direction: VariationDirection },
    PstTapVariationBinary { range_action: String, direction: VariationDirection },
    PstAbsoluteVariationFromInitialTap { range_action: String },
    MinimumMargin,
    MinimumRelativeMargin,
    OptimizeCnecBinary { cnec: String },
    MnecViolation { cnec: String },
    LoopFlowViolation { cnec: String },
    RangeActionVariationBinary { range_action: String },
    TsoRaUsed { operator: String },
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::Flow { cnec } => write!(f, "{}_flow_variable", cnec),
            VariableKey::Setpoint { range_action } => write!(f, "{}_setpoint_variable", range_action),
            VariableKey::AbsoluteVariation { range_action } => {
                write!(f, "{}_absolutevariation_variable", range_action)
            }
            VariableKey::PstTapVariation {
                range_action,
                direction,
            } => write!(f, "{}_{:?}_taptovariation_variable", range_action, direction),
            VariableKey::PstTapVariationBinary {
                range_action,
                direction,
            } => write!(f, "{}_{:?}_taptovariationbinary_variable", range_action, direction),
            VariableKey::PstAbsoluteVariationFromInitialTap { range_action } => {
                write!(f, "{}_absolutevariationfrominitialtap_variable", range_action)
            }
            VariableKey::MinimumMargin => f.write_str("minmargin_variable"),
            VariableKey::MinimumRelativeMargin => f.write_str("minrelmargin_variable"),
            VariableKey::OptimizeCnecBinary { cnec } => write!(f, "{}_optimizecnec_variable", cnec),
            VariableKey::MnecViolation { cnec } => write!(f, "{}_mnecviolation_variable", cnec),
            VariableKey::LoopFlowViolation { cnec } => {
                write!(f, "{}_loopflowviolation_variable", cnec)
            }
            VariableKey::RangeActionVariationBinary { range_action } => {
                write!(f, "{}_isvariation_variable", range_action)
            }
            VariableKey::TsoRaUsed { operator } => write!(f, "{}_tsoraused_variable", operator),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKey {
    Flow { cnec: String },
    AbsoluteVariation { range_action: String, extension: AbsExtension },
    IterativeShrink { range_action: String },
    TapToAngleConversion { range_action: String },
    UpOrDownPstVariation { range_action: String },
    IsVariationInDirection { range_action: String, direction: VariationDirection },
    PstAbsoluteVariationFromInitialTap { range_action: String, extension: AbsExtension },
    MinimumMargin { cnec: String, extension: MarginExtension },
    MinimumRelativeMargin { cnec: String, extension: MarginExtension },
    DontOptimizeCnec { cnec: String, extension: MarginExtension },
    MnecViolation { cnec: String, extension: MarginExtension },
    LoopFlowViolation { cnec: String, extension: AbsExtension },
    IsVariation { range_action: String },
    MaxRa,
    MaxTso,
    TsoRaUsed { operator: String, range_action: String },
    MaxRaPerTso { operator: String },
    MaxPstPerTso { operator: String },
    MaxElementaryActionsPerTso { operator: String },
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKey::Flow { cnec } => write!(f, "{}_flow_constraint", cnec),
            ConstraintKey::AbsoluteVariation {
                range_action,
                extension,
            } => write!(f, "{}_{:?}_absolutevariation_constraint", range_action, extension),
            ConstraintKey::IterativeShrink { range_action } => {
                write!(f, "{}_iterativeshrink_constraint", range_action)
            }
            ConstraintKey::TapToAngleConversion { range_action } => {
                write!(f, "{}_taptoangleconversion_constraint", range_action)
            }
            ConstraintKey::UpOrDownPstVariation { range_action } => {
                write!(f, "{}_upordown_constraint", range_action)
            }
            ConstraintKey::IsVariationInDirection {
                range_action,
                direction,
            } => write!(f, "{}_{:?}_isvariationindirection_constraint", range_action, direction),
            ConstraintKey::PstAbsoluteVariationFromInitialTap {
                range_action,
                extension,
            } => write!(
                f,
                "{}_{:?}_absolutevariationfrominitialtap_constraint",
                range_action, extension
            ),
            ConstraintKey::MinimumMargin { cnec, extension } => {
                write!(f, "{}_{:?}_minmargin_constraint", cnec, extension)
            }
            ConstraintKey::MinimumRelativeMargin { cnec, extension } => {
                write!(f, "{}_{:?}_minrelmargin_constraint", cnec, extension)
            }
            ConstraintKey::DontOptimizeCnec { cnec, extension } => {
                write!(f, "{}_{:?}_dontoptimizecnec_constraint", cnec, extension)
            }
            ConstraintKey::MnecViolation { cnec, extension } => {
                write!(f, "{}_{:?}_mnec_constraint", cnec, extension)
            }
            ConstraintKey::LoopFlowViolation { cnec, extension } => {
                write!(f, "{}_{:?}_maxloopflow_constraint", cnec, extension)
            }
            ConstraintKey::IsVariation { range_action } => {
                write!(f, "{}_isvariation_constraint", range_action)
            }
            ConstraintKey::MaxRa => f.write_str("maxra_constraint"),
            ConstraintKey::MaxTso => f.write_str("maxtso_constraint"),
            ConstraintKey::TsoRaUsed {
                operator,
                range_action,
            } => write!(f, "{}_{}_tsoraused_constraint", operator, range_action),
            ConstraintKey::MaxRaPerTso { operator } => write!(f, "{}_maxrapertso_constraint", operator),
            ConstraintKey::MaxPstPerTso { operator } => {
                write!(f, "{}_maxpstpertso_constraint", operator)
            }
            ConstraintKey::MaxElementaryActionsPerTso { operator } => {
                write!(f, "{}_maxelementaryactionspertso_constraint", operator)
            }
        }
    }
}
