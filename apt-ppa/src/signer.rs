// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP signing of repository metadata.

APT trusts a repository through its `Release` signatures: `InRelease` is
the clearsigned form, `Release.gpg` the detached armored signature, and
`key.gpg` the armored public key clients import. [GpgSigner] produces all
three from a single passphrase-less armored private key.
*/

use {
    crate::error::{PpaError, Result},
    chrono::SubsecRound,
    pgp::{
        crypto::{hash::HashAlgorithm, sym::SymmetricKeyAlgorithm},
        packet::{Packet, SignatureConfig, SignatureType, Subpacket, SubpacketData},
        types::{CompressionAlgorithm, KeyTrait, KeyVersion, PublicKeyTrait, SecretKeyTrait},
        Deserializable, KeyType, SecretKeyParams, SecretKeyParamsBuilder, SignedPublicKey,
        SignedSecretKey,
    },
    pgp_cleartext::cleartext_sign,
    smallvec::{smallvec, SmallVec},
    std::io::Cursor,
};

/// Signs repository metadata with a PGP key.
///
/// The signer is stateless with respect to concurrent callers; signing
/// operations borrow the key immutably.
#[derive(Debug)]
pub struct GpgSigner {
    secret_key: SignedSecretKey,
    public_key: Vec<u8>,
}

impl GpgSigner {
    /// Construct a signer from an armored, passphrase-less private key.
    ///
    /// The armored public key served as `key.gpg` is derived eagerly so a
    /// bad key fails at startup rather than at the first regeneration.
    pub fn new(armored_private_key: &str) -> Result<Self> {
        let (secret_key, _) =
            SignedSecretKey::from_armor_single(Cursor::new(armored_private_key.as_bytes()))
                .map_err(|e| PpaError::SignerInit(format!("reading private key: {}", e)))?;

        let public_key = secret_key.public_key();
        let signed_public_key = public_key
            .sign(&secret_key, String::new)
            .map_err(|e| PpaError::SignerInit(format!("signing public key: {}", e)))?;
        let armored = signed_public_key
            .to_armored_string(None)
            .map_err(|e| PpaError::SignerInit(format!("armoring public key: {}", e)))?;

        Ok(Self {
            secret_key,
            public_key: armored.into_bytes(),
        })
    }

    /// The armored public key corresponding to the signing key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Produce a cleartext signature over `content` (the `InRelease` form).
    pub fn clearsign(&self, content: &[u8]) -> Result<Vec<u8>> {
        let signed = cleartext_sign(
            &self.secret_key,
            String::new,
            HashAlgorithm::SHA2_256,
            Cursor::new(content),
        )?;

        Ok(signed.into_bytes())
    }

    /// Produce an armored detached signature over `content` (the
    /// `Release.gpg` form).
    pub fn detached_sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        let hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::IssuerFingerprint(
                KeyVersion::V4,
                SmallVec::from_slice(&self.secret_key.fingerprint()),
            )),
            Subpacket::regular(SubpacketData::SignatureCreationTime(
                chrono::Utc::now().trunc_subsecs(0),
            )),
        ];
        let unhashed_subpackets =
            vec![Subpacket::regular(SubpacketData::Issuer(self.secret_key.key_id()))];

        let config = SignatureConfig::new_v4(
            Default::default(),
            SignatureType::Binary,
            self.secret_key.algorithm(),
            HashAlgorithm::SHA2_256,
            hashed_subpackets,
            unhashed_subpackets,
        );

        let signature = config.sign(&self.secret_key, String::new, Cursor::new(content))?;

        let packet = Packet::Signature(signature);
        let mut writer = Cursor::new(Vec::new());
        pgp::armor::write(&packet, pgp::armor::BlockType::Signature, &mut writer, None)?;

        Ok(writer.into_inner())
    }
}

/// Obtain a [SecretKeyParamsBuilder] with defaults appropriate for a
/// repository signing key.
///
/// The `primary_user_id` has a format like `Name <email>`.
pub fn signing_secret_key_params_builder(primary_user_id: impl ToString) -> SecretKeyParamsBuilder {
    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Rsa(2048))
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_hash_algorithms(smallvec![
            HashAlgorithm::SHA2_256,
            HashAlgorithm::SHA2_384,
            HashAlgorithm::SHA2_512
        ])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
        .can_create_certificates(false)
        .can_sign(true)
        .primary_user_id(primary_user_id.to_string());

    key_params
}

/// Create a self-signed PGP key pair.
///
/// Returns the private and public halves, each self-signed. Primarily
/// useful for bootstrapping a new repository or for tests; production keys
/// warrant the usual PGP key management hygiene.
pub fn create_self_signed_key(
    params: SecretKeyParams,
) -> pgp::errors::Result<(SignedSecretKey, SignedPublicKey)> {
    let secret_key = params.generate()?;
    let secret_key_signed = secret_key.sign(String::new)?;

    let public_key = secret_key_signed.public_key();
    let public_key_signed = public_key.sign(&secret_key_signed, String::new)?;

    Ok((secret_key_signed, public_key_signed))
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Read};

    fn test_signer() -> (GpgSigner, SignedPublicKey) {
        let params = signing_secret_key_params_builder("Test <test@example.com>")
            .build()
            .unwrap();
        let (secret, public) = create_self_signed_key(params).unwrap();
        let armored_secret = secret.to_armored_string(None).unwrap();

        (GpgSigner::new(&armored_secret).unwrap(), public)
    }

    #[test]
    fn public_key_is_armored() {
        let (signer, _) = test_signer();

        let key = String::from_utf8(signer.public_key().to_vec()).unwrap();
        assert!(key.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
    }

    #[test]
    fn clearsign_verifies_and_preserves_content() {
        let (signer, public) = test_signer();
        let content = b"Origin: test\nSuite: stable\n";

        let signed = signer.clearsign(content).unwrap();

        let mut reader =
            pgp_cleartext::CleartextSignatureReader::new(std::io::Cursor::new(signed));
        let mut recovered = String::new();
        reader.read_to_string(&mut recovered).unwrap();
        let signatures = reader.finalize();

        assert_eq!(recovered.trim_end(), String::from_utf8_lossy(content).trim_end());
        assert!(signatures.verify(&public).unwrap() >= 1);
    }

    #[test]
    fn detached_signature_is_armored() {
        let (signer, _) = test_signer();

        let signature = signer.detached_sign(b"Release body").unwrap();

        let text = String::from_utf8(signature).unwrap();
        assert!(text.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert!(text.trim_end().ends_with("-----END PGP SIGNATURE-----"));
    }

    #[test]
    fn bad_private_key_is_rejected() {
        assert!(matches!(
            GpgSigner::new("not a key").unwrap_err(),
            PpaError::SignerInit(_)
        ));
    }
}
