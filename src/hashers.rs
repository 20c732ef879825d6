use coco_primitives::{frame, hash};

use crate::{
    config::Config,
    errors::CocoError,
    types::{LocalId, Pepper, Rid, Salt},
};

/// `RID_i = H(uid, H(secret, salt_i), pepper)`
///
/// The secret is hashed locally and never leaves the client.
pub fn derive_rid(
    config: &Config,
    user_id: &str,
    secret: &str,
    salt: &Salt,
    pepper: &Pepper,
) -> Result<Rid, CocoError> {
    let costs = config.costs();
    let hardened = hash(costs, &[secret.as_bytes(), salt.as_bytes()])?;
    let rid = hash(costs, &[user_id.as_bytes(), &hardened, pepper.as_bytes()])?;
    Ok(Rid(rid))
}

/// `id_i = H(RID_i, H(outputs_1 || ... || outputs_n, salt_i))`, hex encoded.
///
/// `outputs` are the finalized OPRF values of every Authenticator, in Authenticator order.
pub fn derive_local_id(
    config: &Config,
    rid: &Rid,
    outputs: &[[u8; 32]],
    salt: &Salt,
) -> Result<LocalId, CocoError> {
    let costs = config.costs();
    let parts: Vec<&[u8]> = outputs.iter().map(<[u8; 32]>::as_slice).collect();
    let combined = hash(costs, &[&frame(&parts), salt.as_bytes()])?;
    let id = hash(costs, &[rid.as_bytes(), &combined])?;
    Ok(LocalId(hex::encode(id)))
}
