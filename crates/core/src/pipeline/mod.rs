pub mod detect_phones_use_case;
