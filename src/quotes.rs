//! Closing quotes shown once a session ends.

use rand::seq::SliceRandom;
use rand::Rng;

pub const QUOTES: &[&str] = &[
    "Be still, and know that I am God. (Psalm 46:10)",
    "Peace I leave with you, my peace I give unto you. (John 14:27)",
    "Nowhere with more quiet or freedom from trouble does a man retire than into his own soul. (Marcus Aurelius, Meditations)",
    "Men are disturbed, not by things, but by their views of things. (Epictetus, Enchiridion)",
    "Silence is a true friend who never betrays. (Confucius, Analects)",
    "Nature does not hurry, yet everything is accomplished. (Lao Tzu, Tao Te Ching)",
    "Better than a thousand hollow words is one word that brings peace. (Buddha, Dhammapada 100)",
    "This too shall pass. (Persian proverb)",
    "Nothing can bring you peace but yourself. (Emerson, Self-Reliance)",
    "Heaven is under our feet as well as over our heads. (Thoreau, Walden)",
    "Be happy for this moment. This moment is your life. (Omar Khayyam, Rubaiyat)",
    "Flow with whatever may happen, and let your mind be free. (Zhuangzi)",
    "Forever is composed of nows. (Emily Dickinson)",
    "Reflect upon your present blessings, not on your past misfortunes. (Charles Dickens, A Christmas Carol)",
];

/// Pick one closing quote uniformly at random.
pub fn random_quote<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    QUOTES.choose(rng).copied().unwrap_or("Breathe.")
}
