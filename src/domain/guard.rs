//! Route guard state machine.
//!
//! The guard classifies the signed-in account into one of five states and, for
//! the current path, decides whether the client has to be redirected. It is a
//! pure function of its inputs so it can be driven without any rendering
//! environment.

use super::subscription::{is_in_grace_period, SubscriptionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

pub const LANDING: &str = "/";
pub const SIGNUP: &str = "/signup";
pub const GET_STARTED: &str = "/get-started";
pub const DASHBOARD: &str = "/dashboard";

/// Pages that never require a session.
pub const PUBLIC_PATHS: &[&str] = &[
    "/",
    "/login",
    "/signup",
    "/forgot-password",
    "/reset-password",
    "/pricing",
    "/demo",
];

const SUBMISSION_PREFIX: &str = "/submit/";

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Matches `/submit/:id` with a non-empty, single-segment id.
pub fn is_submission_path(path: &str) -> bool {
    path.strip_prefix(SUBMISSION_PREFIX)
        .map(|id| !id.is_empty() && !id.contains('/'))
        .unwrap_or(false)
}

fn is_exempt(path: &str) -> bool {
    is_public_path(path) || is_submission_path(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GuardState {
    Unauthenticated,
    AuthenticatedNoCustomer,
    AuthenticatedTrialingOrActive,
    AuthenticatedGracePeriod,
    AuthenticatedBlocked,
}

/// What the lookups found out about the current session.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountStanding {
    SignedOut,
    NoCustomer,
    /// Customer exists but no subscription row; treated as `not_started`.
    NoSubscription,
    Subscribed {
        status: SubscriptionStatus,
        payment_issue_since: Option<DateTime<Utc>>,
    },
    /// A lookup failed part way; the guard fails closed.
    LookupFailed,
}

impl AccountStanding {
    pub fn classify(&self, now: DateTime<Utc>) -> GuardState {
        match self {
            AccountStanding::SignedOut => GuardState::Unauthenticated,
            AccountStanding::NoCustomer | AccountStanding::NoSubscription => {
                GuardState::AuthenticatedNoCustomer
            }
            AccountStanding::Subscribed {
                status,
                payment_issue_since,
            } => match status {
                SubscriptionStatus::Trialing | SubscriptionStatus::Active => {
                    GuardState::AuthenticatedTrialingOrActive
                }
                SubscriptionStatus::PastDue => match payment_issue_since {
                    Some(since) if is_in_grace_period(*since, now) => {
                        GuardState::AuthenticatedGracePeriod
                    }
                    _ => GuardState::AuthenticatedBlocked,
                },
                SubscriptionStatus::NotStarted => GuardState::AuthenticatedNoCustomer,
                SubscriptionStatus::Canceled | SubscriptionStatus::Other(_) => {
                    GuardState::AuthenticatedBlocked
                }
            },
            AccountStanding::LookupFailed => GuardState::AuthenticatedBlocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardEvent<'a> {
    /// The client moved to a new path; the account standing is unchanged.
    Navigated { path: &'a str },
    /// Auth or subscription state changed while the client sits on `path`.
    StandingChanged {
        standing: AccountStanding,
        path: &'a str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: &'static str,
}

/// Redirect required for `path` in `state`, if any.
///
/// A redirect target never triggers its own redirect: `/signup` is public,
/// `/get-started` is excluded from the blocked rule, and `/dashboard` is not a
/// forwarding source.
pub fn redirect_for(state: GuardState, path: &str) -> Option<Redirect> {
    match state {
        GuardState::Unauthenticated => {
            if is_exempt(path) {
                None
            } else {
                Some(Redirect { to: SIGNUP })
            }
        }
        GuardState::AuthenticatedNoCustomer | GuardState::AuthenticatedBlocked => {
            if path == GET_STARTED || is_exempt(path) {
                None
            } else {
                Some(Redirect { to: GET_STARTED })
            }
        }
        GuardState::AuthenticatedTrialingOrActive | GuardState::AuthenticatedGracePeriod => {
            if path == GET_STARTED || path == LANDING {
                Some(Redirect { to: DASHBOARD })
            } else {
                None
            }
        }
    }
}

/// `(state, event) -> (state, redirect?)`.
pub fn transition(
    state: GuardState,
    event: GuardEvent<'_>,
    now: DateTime<Utc>,
) -> (GuardState, Option<Redirect>) {
    match event {
        GuardEvent::Navigated { path } => (state, redirect_for(state, path)),
        GuardEvent::StandingChanged { standing, path } => {
            let next = standing.classify(now);
            (next, redirect_for(next, path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ALL_STATES: [GuardState; 5] = [
        GuardState::Unauthenticated,
        GuardState::AuthenticatedNoCustomer,
        GuardState::AuthenticatedTrialingOrActive,
        GuardState::AuthenticatedGracePeriod,
        GuardState::AuthenticatedBlocked,
    ];

    const SAMPLE_PATHS: [&str; 12] = [
        "/",
        "/login",
        "/signup",
        "/pricing",
        "/demo",
        "/get-started",
        "/dashboard",
        "/forms",
        "/settings",
        "/submit/abc",
        "/submit/",
        "/submit/abc/extra",
    ];

    fn past_due(days_ago: i64, now: DateTime<Utc>) -> AccountStanding {
        AccountStanding::Subscribed {
            status: SubscriptionStatus::PastDue,
            payment_issue_since: Some(now - Duration::days(days_ago)),
        }
    }

    #[test]
    fn redirect_targets_never_redirect_again() {
        for state in ALL_STATES {
            for path in SAMPLE_PATHS {
                if let Some(redirect) = redirect_for(state, path) {
                    assert_eq!(
                        redirect_for(state, redirect.to),
                        None,
                        "{state} redirected {path} to {} which redirects again",
                        redirect.to
                    );
                    assert_ne!(redirect.to, path);
                }
            }
        }
    }

    #[test]
    fn signed_out_goes_to_signup_except_public_pages() {
        let s = GuardState::Unauthenticated;
        assert_eq!(redirect_for(s, "/dashboard"), Some(Redirect { to: SIGNUP }));
        assert_eq!(redirect_for(s, "/get-started"), Some(Redirect { to: SIGNUP }));
        assert_eq!(redirect_for(s, "/pricing"), None);
        assert_eq!(redirect_for(s, "/"), None);
        assert_eq!(redirect_for(s, "/submit/form-1"), None);
        assert_eq!(redirect_for(s, "/submit/"), Some(Redirect { to: SIGNUP }));
    }

    #[test]
    fn no_customer_goes_to_get_started() {
        let s = GuardState::AuthenticatedNoCustomer;
        assert_eq!(redirect_for(s, "/forms"), Some(Redirect { to: GET_STARTED }));
        assert_eq!(redirect_for(s, "/get-started"), None);
        assert_eq!(redirect_for(s, "/"), None);
        assert_eq!(redirect_for(s, "/submit/form-1"), None);
    }

    #[test]
    fn active_forwards_from_landing_and_get_started() {
        let s = GuardState::AuthenticatedTrialingOrActive;
        assert_eq!(redirect_for(s, "/"), Some(Redirect { to: DASHBOARD }));
        assert_eq!(redirect_for(s, "/get-started"), Some(Redirect { to: DASHBOARD }));
        assert_eq!(redirect_for(s, "/forms"), None);
        assert_eq!(redirect_for(s, "/submit/form-1"), None);
    }

    #[test]
    fn past_due_within_grace_behaves_like_active() {
        let now = Utc::now();
        assert_eq!(past_due(30, now).classify(now), GuardState::AuthenticatedGracePeriod);
        assert_eq!(past_due(31, now).classify(now), GuardState::AuthenticatedBlocked);

        let (state, redirect) = transition(
            GuardState::Unauthenticated,
            GuardEvent::StandingChanged {
                standing: past_due(3, now),
                path: "/get-started",
            },
            now,
        );
        assert_eq!(state, GuardState::AuthenticatedGracePeriod);
        assert_eq!(redirect, Some(Redirect { to: DASHBOARD }));
    }

    #[test]
    fn canceled_unknown_and_failed_lookups_block() {
        let now = Utc::now();
        for standing in [
            AccountStanding::Subscribed {
                status: SubscriptionStatus::Canceled,
                payment_issue_since: None,
            },
            AccountStanding::Subscribed {
                status: SubscriptionStatus::Other("paused".into()),
                payment_issue_since: None,
            },
            AccountStanding::LookupFailed,
        ] {
            assert_eq!(standing.classify(now), GuardState::AuthenticatedBlocked);
        }
        assert_eq!(
            redirect_for(GuardState::AuthenticatedBlocked, "/pricing"),
            None,
            "a failed lookup must not push the user off a public page"
        );
    }

    #[test]
    fn missing_subscription_row_is_not_started() {
        let now = Utc::now();
        assert_eq!(
            AccountStanding::NoSubscription.classify(now),
            GuardState::AuthenticatedNoCustomer
        );
    }

    #[test]
    fn navigation_keeps_state() {
        let now = Utc::now();
        let (state, redirect) = transition(
            GuardState::AuthenticatedBlocked,
            GuardEvent::Navigated { path: "/tags" },
            now,
        );
        assert_eq!(state, GuardState::AuthenticatedBlocked);
        assert_eq!(redirect, Some(Redirect { to: GET_STARTED }));
    }
}
