diesel::table! {
    users (id) {
        id -> Text,
        username -> Text,
        email -> Text,
        password_hash -> Text,
        full_name -> Text,
        role -> Text,
        office -> Nullable<Text>,
        phone -> Nullable<Text>,
        position -> Nullable<Text>,
        is_active -> Bool,
        last_login_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    dropdowns (id) {
        id -> Text,
        dropdown_type -> Text,
        value -> Text,
        parent_id -> Nullable<Text>,
        sort_order -> Integer,
        is_active -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    tasks (id) {
        id -> Text,
        user_id -> Text,
        created_by -> Text,
        office -> Nullable<Text>,
        task_date -> Date,
        source -> Nullable<Text>,
        category -> Nullable<Text>,
        sub_category -> Nullable<Text>,
        service -> Nullable<Text>,
        obligation -> Nullable<Text>,
        description -> Text,
        status -> Text,
        duration_minutes -> Nullable<Integer>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        completed_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    leaves (id) {
        id -> Text,
        user_id -> Text,
        office -> Nullable<Text>,
        leave_type -> Text,
        start_date -> Date,
        end_date -> Date,
        reason -> Nullable<Text>,
        status -> Text,
        reviewed_by -> Nullable<Text>,
        reviewed_at -> Nullable<Timestamp>,
        review_comment -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    meetings (id) {
        id -> Text,
        organizer_id -> Text,
        office -> Nullable<Text>,
        subject -> Text,
        description -> Nullable<Text>,
        platform -> Text,
        location -> Nullable<Text>,
        start_time -> Timestamp,
        end_time -> Timestamp,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    meeting_participants (meeting_id, user_id) {
        meeting_id -> Text,
        user_id -> Text,
    }
}

diesel::table! {
    notifications (id) {
        id -> Text,
        user_id -> Text,
        kind -> Text,
        message -> Text,
        resource_type -> Nullable<Text>,
        resource_id -> Nullable<Text>,
        is_read -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    audit_logs (id) {
        id -> Text,
        actor_id -> Nullable<Text>,
        actor_office -> Nullable<Text>,
        action -> Text,
        resource_type -> Text,
        resource_id -> Nullable<Text>,
        description -> Text,
        created_at -> Timestamp,
    }
}

diesel::joinable!(meeting_participants -> meetings (meeting_id));
diesel::joinable!(notifications -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    dropdowns,
    tasks,
    leaves,
    meetings,
    meeting_participants,
    notifications,
    audit_logs,
);
