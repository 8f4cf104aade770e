//! Webhook payloads for the cross-database events.
//!
//! Each payload is the JSON body of one notification. Field names are the
//! wire contract with the receiving service and must not change.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three events announced to the Vetted service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A project opened an opportunity with an audition.
    OpportunityCreated,
    /// A candidate completed an audition.
    AuditionSubmission,
    /// A recruiter created a project.
    NewProject,
}

impl NotificationKind {
    /// Stable name sent in the event header and used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpportunityCreated => "opportunity.created",
            Self::AuditionSubmission => "audition.submitted",
            Self::NewProject => "project.created",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload that knows which event it announces.
pub trait Notification: Serialize + Send + Sync {
    /// The event this payload belongs to.
    const KIND: NotificationKind;
}

/// Opportunity created for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityCreated {
    /// Owning project.
    pub project_id: String,
    /// The new opportunity.
    pub opportunity_id: String,
    /// Where candidates take the audition.
    pub audition_url: String,
    /// When the opportunity was created.
    pub created_at: DateTime<Utc>,
}

impl OpportunityCreated {
    /// Builds the payload, deriving the audition link from
    /// `audition_base_url`.
    pub fn new(
        project_id: impl Into<String>,
        opportunity_id: impl Into<String>,
        audition_base_url: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let opportunity_id = opportunity_id.into();
        Self {
            project_id: project_id.into(),
            audition_url: audition_url(audition_base_url, &opportunity_id),
            opportunity_id,
            created_at,
        }
    }

    /// Replaces the derived audition link.
    #[must_use]
    pub fn with_audition_url(mut self, audition_url: impl Into<String>) -> Self {
        self.audition_url = audition_url.into();
        self
    }
}

impl Notification for OpportunityCreated {
    const KIND: NotificationKind = NotificationKind::OpportunityCreated;
}

/// Audition link for `opportunity_id` under `base_url`.
pub fn audition_url(base_url: &str, opportunity_id: &str) -> String {
    format!("{}/audition/{}", base_url.trim_end_matches('/'), opportunity_id)
}

/// Candidate details captured with a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Free-form location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// LinkedIn profile link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    /// Portfolio or personal site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_url: Option<String>,
    /// Self-reported years of experience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<u32>,
    /// Self-reported skills.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

/// One recorded answer to an audition question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditionAnswer {
    /// Question answered.
    pub question_id: String,
    /// 1-based order of the question in the audition.
    pub position: u32,
    /// Question text as shown to the candidate.
    pub question_text: String,
    /// Recording of the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    /// Transcript of the recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Completed audition, forwarded to the Vetted database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditionSubmission {
    /// The submission.
    pub submission_id: String,
    /// Project the audition belongs to.
    pub project_id: String,
    /// Candidate email.
    pub email: String,
    /// Candidate display name.
    pub name: String,
    /// Uploaded resume, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    /// Candidate details.
    pub profile: CandidateProfile,
    /// Answers ordered by question position.
    pub answers: Vec<AuditionAnswer>,
}

impl AuditionSubmission {
    /// Builds a submission with an empty profile and no answers.
    pub fn new(
        submission_id: impl Into<String>,
        project_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            project_id: project_id.into(),
            email: email.into(),
            name: name.into(),
            resume_url: None,
            profile: CandidateProfile::default(),
            answers: Vec::new(),
        }
    }

    /// Sets the resume link.
    #[must_use]
    pub fn with_resume_url(mut self, resume_url: impl Into<String>) -> Self {
        self.resume_url = Some(resume_url.into());
        self
    }

    /// Sets the candidate profile.
    #[must_use]
    pub fn with_profile(mut self, profile: CandidateProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the answers.
    #[must_use]
    pub fn with_answers(mut self, answers: Vec<AuditionAnswer>) -> Self {
        self.answers = answers;
        self
    }

    /// Applies the defaulting rules the receiver relies on.
    ///
    /// A blank name becomes the local part of the email, a blank resume link
    /// is dropped and answers are sorted by position.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.email = self.email.trim().to_string();
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            self.name = self.email.split('@').next().unwrap_or_default().to_string();
        }
        self.resume_url = self.resume_url.filter(|url| !url.trim().is_empty());
        self.answers.sort_by_key(|answer| answer.position);
        self
    }
}

impl Notification for AuditionSubmission {
    const KIND: NotificationKind = NotificationKind::AuditionSubmission;
}

/// Project created by a recruiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    /// The project.
    pub project_id: String,
    /// Project title.
    pub project_title: String,
    /// Recruiter to congratulate.
    pub recruiter_email: String,
    /// Recruiter display name.
    pub recruiter_name: String,
}

impl Notification for NewProject {
    const KIND: NotificationKind = NotificationKind::NewProject;
}
