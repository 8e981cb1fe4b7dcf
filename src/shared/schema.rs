diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        full_name -> Varchar,
        password_hash -> Varchar,
        role -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        client_name -> Varchar,
        client_email -> Varchar,
        client_phone -> Nullable<Varchar>,
        subject -> Varchar,
        description -> Text,
        status -> Varchar,
        priority -> Varchar,
        category -> Nullable<Varchar>,
        department -> Nullable<Varchar>,
        assigned_agent_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_name -> Varchar,
        author_email -> Varchar,
        content -> Text,
        is_internal -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(tickets -> users (assigned_agent_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(users, tickets, ticket_comments);
