// Tatib schema - violation taxonomy and point ledger tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    students (id) {
        id -> Integer,
        nis -> Text,
        name -> Text,
        class_name -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    violation_categories (id) {
        id -> Integer,
        name -> Text,
        description -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    violation_types (id) {
        id -> Integer,
        category_id -> Integer,
        name -> Text,
        description -> Nullable<Text>,
        default_points -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    violations (id) {
        id -> Integer,
        student_id -> Integer,
        type_id -> Integer,
        violation_date -> Text,
        points -> Integer,
        action_taken -> Nullable<Text>,
        notes -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    student_points (student_id) {
        student_id -> Integer,
        total -> Integer,
        updated_at -> Text,
    }
}

diesel::table! {
    account_links (entity_kind, entity_id) {
        entity_kind -> Text,
        entity_id -> Integer,
        account_id -> Integer,
        created_at -> Text,
    }
}

diesel::joinable!(violation_types -> violation_categories (category_id));
diesel::joinable!(violations -> violation_types (type_id));
diesel::joinable!(violations -> students (student_id));
diesel::joinable!(student_points -> students (student_id));

diesel::allow_tables_to_appear_in_same_query!(
    students,
    violation_categories,
    violation_types,
    violations,
    student_points,
);
