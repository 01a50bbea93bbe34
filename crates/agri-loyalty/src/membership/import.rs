use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::domain::{
    ApprovalStatus, BusinessType, MemberType, OccupationProfile, UnknownVariant, VetType,
};
use super::failure::FailureKind;
use super::repository::RewardStore;
use super::service::{MembershipService, RegistrationOutcome, RegistrationRequest};

/// A CSV row that could not be parsed or registered; the rest of the file still is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    /// 1-based line number in the source file, header included.
    pub line: u64,
    pub kind: FailureKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub registered: Vec<RegistrationOutcome>,
    pub failures: Vec<RowFailure>,
}

impl ImportReport {
    pub fn count(&self, status: ApprovalStatus) -> usize {
        self.registered
            .iter()
            .filter(|outcome| outcome.decision.status == status)
            .count()
    }
}

/// Registers members in bulk from a CSV export.
///
/// Expected headers: `display_name`, `phone`, `member_type`, `business_type`,
/// `vet_type`, `is_affiliated_staff`. Occupation cells accept loose spellings
/// such as `Company Employee` or `hospital-clinic`.
pub struct BulkRegistrationImporter;

impl BulkRegistrationImporter {
    pub fn from_path<P, S>(
        path: P,
        service: &MembershipService<S>,
        now: DateTime<Utc>,
    ) -> Result<ImportReport, ImportError>
    where
        P: AsRef<Path>,
        S: RewardStore + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, service, now)
    }

    pub fn from_reader<R, S>(
        reader: R,
        service: &MembershipService<S>,
        now: DateTime<Utc>,
    ) -> Result<ImportReport, ImportError>
    where
        R: Read,
        S: RewardStore + 'static,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        // Every row is parsed before anyone is registered, so a read failure
        // part-way through leaves the store untouched.
        let mut parsed = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let fallback_line = index as u64 + 2;
            let row = match record {
                Ok(record) => {
                    let line = record
                        .position()
                        .map(|position| position.line())
                        .unwrap_or(fallback_line);
                    record
                        .deserialize::<RegistrationRow>(Some(&headers))
                        .map_err(|err| err.to_string())
                        .and_then(|row| row.into_request().map_err(|err| err.to_string()))
                        .map(|request| (line, request))
                        .map_err(|error| (line, error))
                }
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => {
                    let line = err
                        .position()
                        .map(|position| position.line())
                        .unwrap_or(fallback_line);
                    Err((line, err.to_string()))
                }
            };
            parsed.push(row);
        }

        let mut report = ImportReport::default();
        for row in parsed {
            let result = row
                .map_err(|(line, error)| (line, FailureKind::Validation, error))
                .and_then(|(line, request)| {
                    service
                        .register(request, now)
                        .map_err(|err| (line, err.kind(), err.to_string()))
                });

            match result {
                Ok(outcome) => report.registered.push(outcome),
                Err((line, kind, error)) => {
                    warn!(line, error = %error, "registration row rejected");
                    report.failures.push(RowFailure { line, kind, error });
                }
            }
        }

        info!(
            registered = report.registered.len(),
            approved = report.count(ApprovalStatus::Approved),
            pending = report.count(ApprovalStatus::Pending),
            rejected = report.count(ApprovalStatus::Rejected),
            failed = report.failures.len(),
            "bulk registration finished"
        );

        Ok(report)
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationRow {
    display_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    member_type: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    business_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    vet_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    is_affiliated_staff: Option<String>,
}

impl RegistrationRow {
    fn into_request(self) -> Result<RegistrationRequest, UnknownVariant> {
        let member_type = self.member_type.parse::<MemberType>()?;
        let occupation = OccupationProfile {
            business_type: self
                .business_type
                .as_deref()
                .map(str::parse::<BusinessType>)
                .transpose()?,
            vet_type: self
                .vet_type
                .as_deref()
                .map(str::parse::<VetType>)
                .transpose()?,
            is_affiliated_staff: self
                .is_affiliated_staff
                .as_deref()
                .map(parse_flag)
                .transpose()?,
        };
        Ok(RegistrationRequest {
            display_name: self.display_name,
            phone: self.phone,
            member_type,
            occupation,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool, UnknownVariant> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        _ => Err(UnknownVariant {
            field: "affiliation flag",
            value: value.to_string(),
        }),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read registration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid registration CSV data: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::service::ProgramSettings;
    use crate::membership::store::InMemoryRewardStore;
    use std::sync::Arc;

    fn row(member_type: &str) -> RegistrationRow {
        RegistrationRow {
            display_name: "Nok".to_string(),
            phone: None,
            member_type: member_type.to_string(),
            business_type: None,
            vet_type: None,
            is_affiliated_staff: None,
        }
    }

    #[test]
    fn row_parses_loose_occupation_cells() {
        let mut row = row("Company Employee");
        row.business_type = Some("Veterinary Distribution".to_string());
        row.is_affiliated_staff = Some("yes".to_string());

        let request = row.into_request().expect("valid row");
        assert_eq!(request.member_type, MemberType::CompanyEmployee);
        assert_eq!(
            request.occupation.business_type,
            Some(BusinessType::VeterinaryDistribution)
        );
        assert_eq!(request.occupation.is_affiliated_staff, Some(true));
    }

    #[test]
    fn row_with_unknown_vet_type_is_rejected() {
        let mut row = row("veterinarian");
        row.vet_type = Some("zoo".to_string());
        let err = row.into_request().expect_err("unknown vet type");
        assert_eq!(err.field, "vet type");

        let mut row = self::row("veterinarian");
        row.vet_type = Some("hospital-clinic".to_string());
        assert_eq!(
            row.into_request().expect("valid").occupation.vet_type,
            Some(VetType::HospitalClinic)
        );
    }

    #[test]
    fn malformed_row_is_reported_and_the_rest_still_registers() {
        let store = Arc::new(InMemoryRewardStore::new());
        let service = MembershipService::new(store.clone(), ProgramSettings::default());
        let data = "display_name,phone,member_type\n\
                    Anong,0811111111,farm\n\
                    Boon,0822222222\n\
                    Chom,0833333333,livestock shop\n";

        let report = BulkRegistrationImporter::from_reader(data.as_bytes(), &service, Utc::now())
            .expect("file readable");

        let names: Vec<&str> = report
            .registered
            .iter()
            .map(|outcome| outcome.member.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Anong", "Chom"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].line, 3);
        assert_eq!(report.failures[0].kind, FailureKind::Validation);
        for outcome in &report.registered {
            assert!(store
                .fetch_member(&outcome.member.id)
                .expect("fetch")
                .is_some());
        }
    }

    #[test]
    fn affiliation_flag_rejects_unrecognised_values() {
        assert_eq!(parse_flag("N"), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }
}
