pub mod ical;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::core::shared::enums::MeetingPlatform;
use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::models::{DbMeeting, DbMeetingParticipant, DbUser};
use crate::core::shared::schema::{meeting_participants, meetings, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{
    clamp_limit, clean_optional, day_end_exclusive, day_start, new_id, now, validate_date_range,
    with_conn,
};
use crate::core::urls::ApiUrls;
use crate::notifications::{notify_users, NotificationKind};
use crate::security::auth_api::{require_permission, AuthenticatedUser, Permission};
use crate::security::visibility::{MeetingRecord, Scope};
use crate::settings::{AuditAction, AuditLogEntry, ResourceType};

use self::ical::{export_meeting, ics_filename, IcsAttendee};

const MAX_SUBJECT_LEN: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingFilters {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeetingRequest {
    pub subject: String,
    pub description: Option<String>,
    #[serde(default)]
    pub platform: MeetingPlatform,
    pub location: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    #[serde(default)]
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMeetingRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub platform: Option<MeetingPlatform>,
    pub location: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub participant_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingView {
    #[serde(flatten)]
    pub meeting: DbMeeting,
    pub participant_ids: Vec<String>,
}

impl MeetingView {
    fn record(&self) -> MeetingRecord<'_> {
        MeetingRecord {
            meeting: &self.meeting,
            participant_ids: &self.participant_ids,
        }
    }
}

/// Meetings visible to `scope`: those of the office, plus any the caller
/// organizes or attends.
pub fn scoped_meetings_query(
    scope: &Scope,
    filters: &MeetingFilters,
) -> meetings::BoxedQuery<'static, Sqlite> {
    let mut q = meetings::table.into_boxed();

    match scope {
        Scope::All => {}
        Scope::Office { office, user_id } => {
            let attending = meeting_participants::table
                .filter(meeting_participants::user_id.eq(user_id.clone()))
                .select(meeting_participants::meeting_id);
            q = q.filter(
                meetings::office
                    .eq(office.clone())
                    .or(meetings::organizer_id.eq(user_id.clone()))
                    .or(meetings::id.eq_any(attending)),
            );
        }
        Scope::Own { user_id } => {
            let attending = meeting_participants::table
                .filter(meeting_participants::user_id.eq(user_id.clone()))
                .select(meeting_participants::meeting_id);
            q = q.filter(
                meetings::organizer_id
                    .eq(user_id.clone())
                    .or(meetings::id.eq_any(attending)),
            );
        }
    }

    if let Some(from) = filters.from {
        q = q.filter(meetings::start_time.ge(day_start(from)));
    }
    if let Some(to) = filters.to {
        q = q.filter(meetings::start_time.lt(day_end_exclusive(to)));
    }

    q.order(meetings::start_time.asc())
}

fn load_participants(
    conn: &mut SqliteConnection,
    meeting_ids: &[String],
) -> QueryResult<HashMap<String, Vec<String>>> {
    let rows = meeting_participants::table
        .filter(meeting_participants::meeting_id.eq_any(meeting_ids))
        .order(meeting_participants::user_id.asc())
        .load::<DbMeetingParticipant>(conn)?;

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        grouped.entry(row.meeting_id).or_default().push(row.user_id);
    }
    Ok(grouped)
}

fn load_visible_meeting(
    conn: &mut SqliteConnection,
    scope: &Scope,
    id: &str,
) -> ApiResult<MeetingView> {
    let meeting = meetings::table
        .find(id)
        .first::<DbMeeting>(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Meeting"))?;
    let participant_ids = load_participants(conn, std::slice::from_ref(&meeting.id))?
        .remove(&meeting.id)
        .unwrap_or_default();

    let view = MeetingView {
        meeting,
        participant_ids,
    };
    if !scope.permits(&view.record()) {
        return Err(ApiError::not_found("Meeting"));
    }
    Ok(view)
}

/// The organizer may always change a meeting; otherwise the caller needs
/// `ManageMeetings` and the meeting's office.
fn check_can_manage(user: &AuthenticatedUser, meeting: &DbMeeting) -> ApiResult<()> {
    if meeting.organizer_id == user.user_id
        || user.sees_all_offices()
        || (user.has_permission(&Permission::ManageMeetings)
            && user.same_office(meeting.office.as_deref()))
    {
        return Ok(());
    }
    Err(ApiError::Forbidden(
        "Only the organizer or an administrator can change this meeting".to_string(),
    ))
}

fn check_times(start: NaiveDateTime, end: NaiveDateTime) -> ApiResult<()> {
    if end <= start {
        return Err(ApiError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }
    Ok(())
}

fn clean_subject(subject: &str) -> ApiResult<String> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(ApiError::Validation("Subject is required".to_string()));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(ApiError::Validation(format!(
            "Subject must be at most {MAX_SUBJECT_LEN} characters"
        )));
    }
    Ok(subject.to_string())
}

/// Resolves the participant list: duplicates collapse, the organizer is
/// always included and every other id must be an active user the organizer
/// can invite.
pub fn resolve_participants(
    conn: &mut SqliteConnection,
    organizer: &AuthenticatedUser,
    organizer_id: &str,
    requested: &[String],
) -> ApiResult<Vec<String>> {
    let mut ids: BTreeSet<String> = requested
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    ids.remove(organizer_id);

    let invited: Vec<String> = ids.iter().cloned().collect();
    let found = users::table
        .filter(users::id.eq_any(&invited))
        .load::<DbUser>(conn)?;

    for id in &invited {
        let Some(user) = found.iter().find(|u| &u.id == id) else {
            return Err(ApiError::Validation(format!("Participant {id} does not exist")));
        };
        if !user.is_active {
            return Err(ApiError::Validation(format!(
                "Participant {} is inactive",
                user.username
            )));
        }
        if !organizer.sees_all_offices() && !organizer.same_office(user.office.as_deref()) {
            return Err(ApiError::Forbidden(format!(
                "Participant {} is outside your office",
                user.username
            )));
        }
    }

    ids.insert(organizer_id.to_string());
    Ok(ids.into_iter().collect())
}

fn replace_participants(
    conn: &mut SqliteConnection,
    meeting_id: &str,
    participant_ids: &[String],
) -> QueryResult<()> {
    diesel::delete(
        meeting_participants::table.filter(meeting_participants::meeting_id.eq(meeting_id)),
    )
    .execute(conn)?;
    let rows: Vec<DbMeetingParticipant> = participant_ids
        .iter()
        .map(|user_id| DbMeetingParticipant {
            meeting_id: meeting_id.to_string(),
            user_id: user_id.clone(),
        })
        .collect();
    diesel::insert_into(meeting_participants::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn others<'a>(ids: &'a [String], except: &'a str) -> Vec<String> {
    ids.iter().filter(|id| *id != except).cloned().collect()
}

pub async fn handle_meeting_list(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filters): Query<MeetingFilters>,
) -> ApiResult<Json<Vec<MeetingView>>> {
    validate_date_range(filters.from, filters.to)?;
    let scope = Scope::for_user(&user);

    let views = with_conn(&state.conn, move |conn| {
        let rows = scoped_meetings_query(&scope, &filters)
            .limit(clamp_limit(filters.limit, 100, 1000))
            .offset(filters.offset.unwrap_or(0).max(0))
            .load::<DbMeeting>(conn)?;
        let ids: Vec<String> = rows.iter().map(|m| m.id.clone()).collect();
        let mut participants = load_participants(conn, &ids)?;

        Ok(rows
            .into_iter()
            .map(|meeting| MeetingView {
                participant_ids: participants.remove(&meeting.id).unwrap_or_default(),
                meeting,
            })
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(views))
}

pub async fn handle_meeting_get(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MeetingView>> {
    let scope = Scope::for_user(&user);
    let view = with_conn(&state.conn, move |conn| load_visible_meeting(conn, &scope, &id)).await?;
    Ok(Json(view))
}

pub async fn handle_meeting_create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateMeetingRequest>,
) -> ApiResult<(StatusCode, Json<MeetingView>)> {
    require_permission(&user, Permission::ScheduleMeetings)?;
    let subject = clean_subject(&req.subject)?;
    check_times(req.start_time, req.end_time)?;

    let view = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let participant_ids =
                resolve_participants(conn, &user, &user.user_id, &req.participant_ids)?;

            let timestamp = now();
            let meeting = DbMeeting {
                id: new_id(),
                organizer_id: user.user_id.clone(),
                office: user.office.clone(),
                subject,
                description: clean_optional(req.description),
                platform: req.platform,
                location: clean_optional(req.location),
                start_time: req.start_time,
                end_time: req.end_time,
                created_at: timestamp,
                updated_at: timestamp,
            };
            diesel::insert_into(meetings::table).values(&meeting).execute(conn)?;
            replace_participants(conn, &meeting.id, &participant_ids)?;

            notify_users(
                conn,
                &others(&participant_ids, &user.user_id),
                NotificationKind::MeetingInvite,
                &format!(
                    "{} invited you to '{}' at {}",
                    user.username, meeting.subject, meeting.start_time
                ),
                Some((ResourceType::Meeting, &meeting.id)),
            )?;

            AuditLogEntry::new(AuditAction::Create, ResourceType::Meeting)
                .with_actor(&user)
                .with_resource_id(&meeting.id)
                .with_description(format!(
                    "Scheduled '{}' with {} participant(s)",
                    meeting.subject,
                    participant_ids.len()
                ))
                .record(conn)?;

            Ok(MeetingView {
                meeting,
                participant_ids,
            })
        })
    })
    .await?;

    info!("Meeting {} scheduled by {}", view.meeting.id, view.meeting.organizer_id);
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn handle_meeting_update(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateMeetingRequest>,
) -> ApiResult<Json<MeetingView>> {
    let subject = req.subject.as_deref().map(clean_subject).transpose()?;
    let scope = Scope::for_user(&user);

    let view = with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let MeetingView {
                mut meeting,
                participant_ids: previous,
            } = load_visible_meeting(conn, &scope, &id)?;
            check_can_manage(&user, &meeting)?;

            if let Some(subject) = subject {
                meeting.subject = subject;
            }
            if req.description.is_some() {
                meeting.description = clean_optional(req.description);
            }
            if let Some(platform) = req.platform {
                meeting.platform = platform;
            }
            if req.location.is_some() {
                meeting.location = clean_optional(req.location);
            }
            if let Some(start) = req.start_time {
                meeting.start_time = start;
            }
            if let Some(end) = req.end_time {
                meeting.end_time = end;
            }
            check_times(meeting.start_time, meeting.end_time)?;
            meeting.updated_at = now();

            let participant_ids = match &req.participant_ids {
                Some(requested) => {
                    let ids = resolve_participants(conn, &user, &meeting.organizer_id, requested)?;
                    replace_participants(conn, &meeting.id, &ids)?;
                    ids
                }
                None => previous.clone(),
            };

            diesel::update(meetings::table.find(&meeting.id))
                .set(&meeting)
                .execute(conn)?;

            let (invited, kept): (Vec<String>, Vec<String>) = others(&participant_ids, &user.user_id)
                .into_iter()
                .partition(|id| !previous.contains(id));
            let resource = Some((ResourceType::Meeting, meeting.id.as_str()));
            notify_users(
                conn,
                &invited,
                NotificationKind::MeetingInvite,
                &format!(
                    "{} invited you to '{}' at {}",
                    user.username, meeting.subject, meeting.start_time
                ),
                resource,
            )?;
            notify_users(
                conn,
                &kept,
                NotificationKind::MeetingUpdated,
                &format!(
                    "'{}' was updated, now at {}",
                    meeting.subject, meeting.start_time
                ),
                resource,
            )?;

            AuditLogEntry::new(AuditAction::Update, ResourceType::Meeting)
                .with_actor(&user)
                .with_resource_id(&meeting.id)
                .with_description(format!("Updated '{}'", meeting.subject))
                .record(conn)?;

            Ok(MeetingView {
                meeting,
                participant_ids,
            })
        })
    })
    .await?;

    Ok(Json(view))
}

pub async fn handle_meeting_delete(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let scope = Scope::for_user(&user);

    with_conn(&state.conn, move |conn| {
        conn.transaction::<_, ApiError, _>(|conn| {
            let view = load_visible_meeting(conn, &scope, &id)?;
            check_can_manage(&user, &view.meeting)?;

            notify_users(
                conn,
                &others(&view.participant_ids, &user.user_id),
                NotificationKind::MeetingCancelled,
                &format!(
                    "'{}' at {} was cancelled",
                    view.meeting.subject, view.meeting.start_time
                ),
                Some((ResourceType::Meeting, &view.meeting.id)),
            )?;

            diesel::delete(
                meeting_participants::table
                    .filter(meeting_participants::meeting_id.eq(&view.meeting.id)),
            )
            .execute(conn)?;
            diesel::delete(meetings::table.find(&view.meeting.id)).execute(conn)?;

            AuditLogEntry::new(AuditAction::Delete, ResourceType::Meeting)
                .with_actor(&user)
                .with_resource_id(&view.meeting.id)
                .with_description(format!("Deleted '{}'", view.meeting.subject))
                .record(conn)?;
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_meeting_ics(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let scope = Scope::for_user(&user);

    let (view, people) = with_conn(&state.conn, move |conn| {
        let view = load_visible_meeting(conn, &scope, &id)?;
        let people = users::table
            .filter(users::id.eq_any(&view.participant_ids).or(users::id.eq(&view.meeting.organizer_id)))
            .load::<DbUser>(conn)?;
        Ok((view, people))
    })
    .await?;

    let as_attendee = |u: &DbUser| IcsAttendee {
        name: u.full_name.clone(),
        email: u.email.clone(),
    };
    let organizer = people
        .iter()
        .find(|u| u.id == view.meeting.organizer_id)
        .map(as_attendee)
        .ok_or_else(|| ApiError::Internal("Meeting organizer is missing".to_string()))?;
    let attendees: Vec<IcsAttendee> = people
        .iter()
        .filter(|u| u.id != view.meeting.organizer_id)
        .map(as_attendee)
        .collect();

    let body = export_meeting(&view.meeting, &organizer, &attendees);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        ics_filename(&view.meeting.id, view.meeting.start_time)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

pub fn configure_meeting_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::MEETINGS,
            get(handle_meeting_list).post(handle_meeting_create),
        )
        .route(
            ApiUrls::MEETING_BY_ID,
            get(handle_meeting_get)
                .put(handle_meeting_update)
                .delete(handle_meeting_delete),
        )
        .route(ApiUrls::MEETING_ICS, get(handle_meeting_ics))
}
