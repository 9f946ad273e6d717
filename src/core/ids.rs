use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a disbursed loan, as assigned by the upstream source system.
    ///
    /// # Examples
    ///
    /// ```
    /// use loan_metrics_engine::core::ids::LoanId;
    ///
    /// let a = LoanId::new("LN-19808");
    /// assert_eq!(a.as_str(), "LN-19808");
    /// ```
    LoanId
);

string_id!(
    /// Identifier of a single repayment transaction.
    RepaymentId
);

string_id!(
    /// Identifier of the loan officer responsible for a loan.
    OfficerId
);

string_id!(
    /// Identifier of a branch. Officers belong to exactly one branch.
    BranchId
);

string_id!(CustomerId);
