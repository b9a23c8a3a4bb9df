//! Helpers shared by the integration tests: programmatically
//! generated RSA and DSA keys in this crate's packet types.

use num_bigint_dig::ModInverse;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rsa::RsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};

use quill_openpgp::crypto::mpi::{self, MPI};
use quill_openpgp::packet::Key;
use quill_openpgp::types::PublicKeyAlgorithm;

pub const CREATION_TIME: u32 = 1136073600;

/// A deterministic RNG so the tests are reproducible.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Generates an RSA key pair as packet types.
pub fn rsa_key(seed: u64) -> (Key, mpi::SecretKeyMaterial) {
    let mut rng = rng(seed);
    let private = RsaPrivateKey::new(&mut rng, 2048)
        .expect("RSA key generation");

    let key = Key::new(
        CREATION_TIME,
        PublicKeyAlgorithm::RSAEncryptSign,
        mpi::PublicKey::RSA {
            e: MPI::new(&private.e().to_bytes_be()),
            n: MPI::new(&private.n().to_bytes_be()),
        });

    let primes = private.primes();
    let (p, q) = (&primes[0], &primes[1]);
    let u = p.clone().mod_inverse(q)
        .expect("p is invertible mod q")
        .to_biguint()
        .expect("the inverse is positive");

    let secret = mpi::SecretKeyMaterial::RSA {
        d: MPI::new(&private.d().to_bytes_be()),
        p: MPI::new(&p.to_bytes_be()),
        q: MPI::new(&q.to_bytes_be()),
        u: MPI::new(&u.to_bytes_be()),
    };

    (key, secret)
}

/// Generates a DSA key pair as packet types.
pub fn dsa_key(seed: u64) -> (Key, mpi::SecretKeyMaterial) {
    let mut rng = rng(seed);
    let components = dsa::Components::generate(
        &mut rng, dsa::KeySize::DSA_2048_256);
    let signing = dsa::SigningKey::generate(&mut rng, components);
    let verifying = signing.verifying_key();
    let components = verifying.components();

    let key = Key::new(
        CREATION_TIME,
        PublicKeyAlgorithm::DSA,
        mpi::PublicKey::DSA {
            p: MPI::new(&components.p().to_bytes_be()),
            q: MPI::new(&components.q().to_bytes_be()),
            g: MPI::new(&components.g().to_bytes_be()),
            y: MPI::new(&verifying.y().to_bytes_be()),
        });

    let secret = mpi::SecretKeyMaterial::DSA {
        x: MPI::new(&signing.x().to_bytes_be()),
    };

    (key, secret)
}
