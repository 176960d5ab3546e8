//! Response envelope shared by every JSON handler: `{ "data": ... }`.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
