use rastac::core::classifier::{
    AssetClassifier, LOADABLE_EXTENSIONS, LOADABLE_MEDIA_TYPES, PROBABLE_DATA_KEYS,
};
use rastac::{Asset, FileType, Item};

#[test]
fn every_loadable_media_type_is_loadable() {
    for media_type in LOADABLE_MEDIA_TYPES {
        let asset = Asset::new("data", "https://example.com/file").with_media_type(media_type);
        let c = AssetClassifier::classify(&asset, Some("data"));
        assert!(c.is_loadable, "media type '{}' should be loadable", media_type);
    }
}

#[test]
fn appending_a_suffix_does_not_flip_loadability() {
    // The substring-match contract holds in both directions: a provider
    // reporting a more specific variant of a known type still matches.
    for media_type in LOADABLE_MEDIA_TYPES {
        let extended = format!("{}; charset=binary", media_type);
        let asset = Asset::new("data", "https://example.com/file").with_media_type(extended);
        let c = AssetClassifier::classify(&asset, Some("data"));
        assert!(c.is_loadable, "extended '{}' should stay loadable", media_type);
    }
}

#[test]
fn truncated_known_media_type_still_matches() {
    let asset = Asset::new("data", "https://example.com/file").with_media_type("image/tiff");
    assert!(AssetClassifier::classify(&asset, Some("data")).is_loadable);
}

#[test]
fn every_loadable_extension_is_loadable_without_media_type() {
    for ext in LOADABLE_EXTENSIONS {
        let asset = Asset::new("data", format!("https://example.com/file{}", ext));
        let c = AssetClassifier::classify(&asset, Some("data"));
        assert!(c.is_loadable, "extension '{}' should be loadable", ext);
    }
}

#[test]
fn thumbnail_key_rejected_regardless_of_media_type() {
    for media_type in LOADABLE_MEDIA_TYPES {
        let asset =
            Asset::new("thumbnail", "https://example.com/t.tif").with_media_type(media_type);
        let c = AssetClassifier::classify(&asset, Some("thumbnail"));
        assert!(!c.is_loadable, "thumbnail must never load ('{}')", media_type);
    }
}

#[test]
fn probable_data_keys_accepted_only_without_media_type() {
    for key in PROBABLE_DATA_KEYS {
        let untyped = Asset::new(key, "https://example.com/asset");
        assert!(
            AssetClassifier::classify(&untyped, Some(key)).is_loadable,
            "untyped '{}' should be loadable",
            key
        );
    }

    // An unknown media type on the same key blocks the fallback
    let typed = Asset::new("data", "https://example.com/asset").with_media_type("application/pdf");
    assert!(!AssetClassifier::classify(&typed, Some("data")).is_loadable);

    // Unknown keys without media type are rejected
    let unknown = Asset::new("ancillary", "https://example.com/asset");
    assert!(!AssetClassifier::classify(&unknown, Some("ancillary")).is_loadable);
}

#[test]
fn file_types_from_media_type() {
    let cases = [
        (
            "image/tiff; application=geotiff; profile=cloud-optimized",
            FileType::Cog,
        ),
        ("image/tiff; application=geotiff", FileType::GeoTiff),
        ("image/tiff", FileType::GeoTiff),
        ("application/x-netcdf", FileType::NetCdf),
        ("image/png", FileType::Png),
        ("image/jpeg", FileType::Jpeg),
        ("application/xml", FileType::Xml),
        ("application/json", FileType::Json),
        ("text/plain", FileType::Text),
    ];
    for (media_type, expected) in cases {
        let asset = Asset::new("data", "https://example.com/file").with_media_type(media_type);
        assert_eq!(AssetClassifier::file_type(&asset), expected, "{}", media_type);
    }
}

#[test]
fn file_types_from_extension_when_untyped() {
    let cases = [
        ("scene.tif", FileType::GeoTiff),
        ("scene.tiff", FileType::GeoTiff),
        ("cube.nc", FileType::NetCdf),
        ("view.png", FileType::Png),
        ("view.jpg", FileType::Jpeg),
        ("meta.xml", FileType::Xml),
        ("refs.json", FileType::Json),
    ];
    for (name, expected) in cases {
        let asset = Asset::new("data", format!("https://example.com/{}", name));
        assert_eq!(AssetClassifier::file_type(&asset), expected, "{}", name);
    }

    let odd = Asset::new("data", "https://example.com/blob.hdf5?sig=x");
    assert_eq!(
        AssetClassifier::file_type(&odd),
        FileType::Extension("HDF5".to_string())
    );

    let bare = Asset::new("data", "https://example.com/blob");
    assert_eq!(AssetClassifier::file_type(&bare), FileType::Unknown);
}

#[test]
fn loadable_assets_filters_an_item() {
    let mut item = Item::new("scene-1");
    item.assets.insert(
        "data".to_string(),
        Asset::new("data", "https://example.com/scene.tif").with_media_type("image/tiff"),
    );
    item.assets.insert(
        "thumbnail".to_string(),
        Asset::new("thumbnail", "https://example.com/t.png").with_media_type("image/png"),
    );
    item.assets.insert(
        "metadata".to_string(),
        Asset::new("metadata", "https://example.com/m.xml").with_media_type("application/xml"),
    );

    let loadable = AssetClassifier::loadable_assets(&item);
    let keys: Vec<&str> = loadable.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec!["data"]);
}
