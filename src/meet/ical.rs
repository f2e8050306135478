//! iCalendar (RFC 5545) export for meetings.

use chrono::NaiveDateTime;
use icalendar::{Calendar, Component, Event as IcalEvent, EventLike, Property};

use crate::core::shared::models::DbMeeting;

/// Someone listed on the exported event.
#[derive(Debug, Clone)]
pub struct IcsAttendee {
    pub name: String,
    pub email: String,
}

pub fn meeting_to_ical(
    meeting: &DbMeeting,
    organizer: &IcsAttendee,
    attendees: &[IcsAttendee],
) -> IcalEvent {
    let mut event = IcalEvent::new();
    event.uid(&meeting.id);
    event.summary(&meeting.subject);
    event.starts(meeting.start_time.and_utc());
    event.ends(meeting.end_time.and_utc());
    event.timestamp(meeting.updated_at.and_utc());

    if let Some(ref desc) = meeting.description {
        event.description(desc);
    }
    match meeting.location {
        Some(ref loc) => {
            event.location(loc);
        }
        None => {
            event.location(meeting.platform.as_str());
        }
    }

    event.append_property(
        Property::new("ORGANIZER", &format!("mailto:{}", organizer.email))
            .add_parameter("CN", &organizer.name)
            .done(),
    );
    for attendee in attendees {
        event.append_property(
            Property::new("ATTENDEE", &format!("mailto:{}", attendee.email))
                .add_parameter("CN", &attendee.name)
                .done(),
        );
    }

    event.done()
}

pub fn export_meeting(
    meeting: &DbMeeting,
    organizer: &IcsAttendee,
    attendees: &[IcsAttendee],
) -> String {
    let mut calendar = Calendar::new();
    calendar.name(&meeting.subject);
    calendar.push(meeting_to_ical(meeting, organizer, attendees));
    calendar.done().to_string()
}

/// File name offered for a meeting's `.ics` download.
pub fn ics_filename(meeting_id: &str, start: NaiveDateTime) -> String {
    format!("meeting-{}-{}.ics", start.format("%Y%m%d"), meeting_id)
}
