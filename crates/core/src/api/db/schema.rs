diesel::table! {
    charges (id) {
        id -> Text,
        status -> Text,
        amount -> Int8,
        currency -> Text,
        description -> Nullable<Text>,
        customer_id -> Nullable<Text>,
        payment_method_type -> Nullable<Text>,
        card_last4 -> Nullable<Text>,
        created_at -> Int8,
    }
}

diesel::table! {
    idempotency_records (id) {
        id -> Int4,
        idempotency_key -> Text,
        charge_id -> Text,
        response_data -> Text,
        created_at -> Int8,
    }
}

diesel::allow_tables_to_appear_in_same_query!(charges, idempotency_records);
