// 将 YAML 中的空值（例如只写了 `listen:`）反序列化为默认值
pub mod null_as_default {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        let value = Option::<T>::deserialize(deserializer)?;
        Ok(value.unwrap_or_default())
    }
}
