pub fn public_key_key(user_id: &str) -> String {
    format!("public_key:{}", user_id)
}
